//! Cache key construction, shared by the read path and the invalidator.
//!
//! Key layout:
//!
//! ```text
//! {Specification}-{segment-}*{search}-{tenant}-{operation}-{dto}
//!
//! MerchantByIdSpec-42--t1-FirstOrDefaultAsync-MerchantEntityDto
//! MerchantListPagedSpec-1-10--t1-ListAsync-MerchantEntityDto
//! MerchantListPagedSpec--t1-ListAsync-MerchantEntityDto
//! ```
//!
//! Segments are the specification's parameters (entity id, page number, page
//! size). The search part is empty when the specification has no free-text
//! filter, which is what produces the double dash before the tenant.
//!
//! Every part is percent-escaped before joining (`-` as `%2D`, `%` as `%25`),
//! so a rendered key never contains a dash that is not a separator. Tenants,
//! ids and search terms made of letters and digits render unchanged.
//!
//! Invalidation patterns are globs over the same layout: `*` matches any run
//! of characters, `?` exactly one, and `\` escapes the next character.

use crate::entity::Entity;
use crate::tenant::TenantId;
use std::borrow::Cow;
use std::fmt;

const SEPARATOR: char = '-';

/// Read shape recorded in the key, so that the same specification cached as
/// a single item, a list or a page never collide.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ReadOperation {
    FirstOrDefault,
    List,
    Paged,
}

impl ReadOperation {
    pub const ALL: [ReadOperation; 3] = [
        ReadOperation::FirstOrDefault,
        ReadOperation::List,
        ReadOperation::Paged,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ReadOperation::FirstOrDefault => "FirstOrDefaultAsync",
            ReadOperation::List => "ListAsync",
            ReadOperation::Paged => "GetPagedResultAsync",
        }
    }
}

impl fmt::Display for ReadOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Name of the single-item specification for an entity type.
pub fn by_id_spec_name<E: Entity>() -> String {
    format!("{}ByIdSpec", E::entity_name())
}

/// Name of the list/paged specification for an entity type.
pub fn list_paged_spec_name<E: Entity>() -> String {
    format!("{}ListPagedSpec", E::entity_name())
}

/// Deterministic cache key.
///
/// Two keys built from identical inputs always render to the identical string.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct CacheKey {
    specification: String,
    segments: Vec<String>,
    search: String,
    tenant: TenantId,
    operation: ReadOperation,
    dto: String,
}

impl CacheKey {
    pub fn new(
        specification: impl Into<String>,
        tenant: TenantId,
        operation: ReadOperation,
        dto: impl Into<String>,
    ) -> Self {
        CacheKey {
            specification: specification.into(),
            segments: Vec::new(),
            search: String::new(),
            tenant,
            operation,
            dto: dto.into(),
        }
    }

    /// Append a specification parameter.
    pub fn segment(mut self, value: impl fmt::Display) -> Self {
        self.segments.push(value.to_string());
        self
    }

    pub fn segments<I, V>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: fmt::Display,
    {
        self.segments
            .extend(values.into_iter().map(|v| v.to_string()));
        self
    }

    pub fn search(mut self, term: Option<&str>) -> Self {
        self.search = term.unwrap_or_default().to_string();
        self
    }

    /// Key of the single-item read for one entity.
    pub fn by_id<E: Entity>(id: &E::Id, tenant: &TenantId) -> Self {
        CacheKey::new(
            by_id_spec_name::<E>(),
            tenant.clone(),
            ReadOperation::FirstOrDefault,
            E::dto_name(),
        )
        .segment(id)
    }

    /// Key of the list read of one page, as pre-warmed for the first page.
    pub fn list_page<E: Entity>(page_number: u32, page_size: u32, tenant: &TenantId) -> Self {
        CacheKey::new(
            list_paged_spec_name::<E>(),
            tenant.clone(),
            ReadOperation::List,
            E::dto_name(),
        )
        .segment(page_number)
        .segment(page_size)
    }

    pub fn tenant(&self) -> &TenantId {
        &self.tenant
    }

    pub fn operation(&self) -> ReadOperation {
        self.operation
    }

    pub fn render(&self) -> String {
        let mut key = String::with_capacity(64);
        key.push_str(&encode_part(&self.specification));
        for segment in &self.segments {
            key.push(SEPARATOR);
            key.push_str(&encode_part(segment));
        }
        for part in [
            self.search.as_str(),
            self.tenant.as_str(),
            self.operation.as_str(),
            self.dto.as_str(),
        ] {
            key.push(SEPARATOR);
            key.push_str(&encode_part(part));
        }
        key
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

/// Glob patterns removed after a mutation of one entity.
pub struct InvalidationPatterns;

impl InvalidationPatterns {
    /// Patterns for entity type `E`, id `id`, tenant `tenant`:
    ///
    /// 1. every unparameterised list view of the tenant
    /// 2. the exact single-item entry for the id
    /// 3. the default first page (1/10) list entry
    /// 4. every other parameterised or filtered list view of the tenant,
    ///    one pattern per read shape
    /// 5. the id's entry under any read shape
    ///
    /// The third pattern is needed because its paging segments sit where the
    /// first pattern expects the empty search part. The fourth ends with the
    /// literal tenant, operation and DTO parts; since no part contains an
    /// unescaped dash, that suffix can only match the tenant's own keys.
    pub fn for_entity<E: Entity>(id: &E::Id, tenant: &TenantId) -> Vec<String> {
        let list_spec = pattern_part(&list_paged_spec_name::<E>());
        let tenant_part = pattern_part(tenant.as_str());

        let mut patterns = vec![
            format!("{}--{}-*", list_spec, tenant_part),
            escape_glob(&CacheKey::by_id::<E>(id, tenant).render()),
            escape_glob(&CacheKey::list_page::<E>(1, 10, tenant).render()),
        ];
        patterns.extend(tenant_views::<E>(&list_spec, &tenant_part));
        patterns.push(format!(
            "{}-{}--{}-*",
            pattern_part(&by_id_spec_name::<E>()),
            pattern_part(&id.to_string()),
            tenant_part
        ));
        patterns
    }

    /// Patterns that drop every cached view of `E` for a tenant.
    pub fn for_tenant<E: Entity>(tenant: &TenantId) -> Vec<String> {
        let tenant_part = pattern_part(tenant.as_str());
        let mut patterns =
            tenant_views::<E>(&pattern_part(&list_paged_spec_name::<E>()), &tenant_part);
        patterns.extend(tenant_views::<E>(
            &pattern_part(&by_id_spec_name::<E>()),
            &tenant_part,
        ));
        patterns
    }
}

/// `{spec}-*-{tenant}-{operation}-{dto}` for every read shape.
fn tenant_views<E: Entity>(spec: &str, tenant_part: &str) -> Vec<String> {
    let dto = pattern_part(&E::dto_name());
    ReadOperation::ALL
        .iter()
        .map(|operation| format!("{}-*-{}-{}-{}", spec, tenant_part, operation, dto))
        .collect()
}

fn pattern_part(value: &str) -> String {
    escape_glob(&encode_part(value))
}

/// Escape the separator inside one key part: `%` becomes `%25` and `-`
/// becomes `%2D`.
pub fn encode_part(value: &str) -> Cow<'_, str> {
    if !value.contains(|c: char| c == SEPARATOR || c == '%') {
        return Cow::Borrowed(value);
    }

    let mut encoded = String::with_capacity(value.len() + 6);
    for c in value.chars() {
        match c {
            '%' => encoded.push_str("%25"),
            SEPARATOR => encoded.push_str("%2D"),
            c => encoded.push(c),
        }
    }
    Cow::Owned(encoded)
}

/// Escape glob metacharacters so that `value` only matches itself.
pub fn escape_glob(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, '*' | '?' | '[' | ']' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// Match `key` against a glob `pattern` (`*`, `?`, `\` escapes).
pub fn glob_matches(pattern: &str, key: &str) -> bool {
    let pattern: Vec<char> = pattern.chars().collect();
    let key: Vec<char> = key.chars().collect();

    let (mut p, mut k) = (0, 0);
    // position after the last `*` and the key position it was tried against
    let mut backtrack: Option<(usize, usize)> = None;

    while k < key.len() {
        match pattern.get(p) {
            Some('*') => {
                p += 1;
                backtrack = Some((p, k));
                continue;
            }
            Some('?') => {
                p += 1;
                k += 1;
                continue;
            }
            Some('\\') if p + 1 < pattern.len() && pattern[p + 1] == key[k] => {
                p += 2;
                k += 1;
                continue;
            }
            Some(c) if *c != '\\' && *c == key[k] => {
                p += 1;
                k += 1;
                continue;
            }
            _ => {}
        }

        match backtrack {
            Some((star_p, star_k)) => {
                p = star_p;
                k = star_k + 1;
                backtrack = Some((star_p, star_k + 1));
            }
            None => return false,
        }
    }

    pattern[p..].iter().all(|c| *c == '*')
}
