//! Write-then-read walkthrough over the in-memory cache and store.

use chrono::{DateTime, Utc};
use compliance_cache::{
    backend::{CacheBackend, InMemoryBackend},
    error::{Error, Result},
    observability::CountingMetrics,
    specification::{ById, ListPaged},
    strategy::CacheStrategy,
    tenant::FixedTenant,
    CacheInvalidator, CachedReadRepository, Entity, EntityWriteWorkflow, InMemoryRepository,
    ReadOperation, Specification, TenantId,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Example entity: a vendor under assessment
#[derive(Clone, Serialize, Deserialize, Debug)]
struct Merchant {
    id: u64,
    tenant_id: TenantId,
    name: String,
    risk_tier: u8,
    updated_at: DateTime<Utc>,
}

#[derive(Clone, Serialize, Deserialize, Debug)]
struct MerchantDto {
    id: u64,
    name: String,
    risk_tier: u8,
}

impl Entity for Merchant {
    type Id = u64;
    type Dto = MerchantDto;

    fn id(&self) -> u64 {
        self.id
    }

    fn tenant_id(&self) -> &TenantId {
        &self.tenant_id
    }

    fn last_modified(&self) -> DateTime<Utc> {
        self.updated_at
    }

    fn entity_name() -> &'static str {
        "Merchant"
    }

    fn to_dto(&self) -> MerchantDto {
        MerchantDto {
            id: self.id,
            name: self.name.clone(),
            risk_tier: self.risk_tier,
        }
    }

    fn matches_search(&self, term: &str) -> bool {
        self.name.to_lowercase().contains(&term.to_lowercase())
    }
}

fn merchant(id: u64, tenant: &TenantId, name: &str, risk_tier: u8) -> Merchant {
    Merchant {
        id,
        tenant_id: tenant.clone(),
        name: name.to_string(),
        risk_tier,
        updated_at: Utc::now(),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Debug)
        .try_init()
        .ok();

    println!("\n=== Compliance Cache - Write then Read ===\n");

    let tenant = TenantId::new("acme");
    let cache = InMemoryBackend::new();
    let metrics = Arc::new(CountingMetrics::new());

    let writes = EntityWriteWorkflow::new(
        InMemoryRepository::<Merchant>::new(),
        CacheInvalidator::new(cache.clone()),
        FixedTenant(tenant.clone()),
    );
    let reads = CachedReadRepository::new(cache.clone()).with_metrics(metrics.clone());

    // 1. Seed through the write path
    println!("1. Creating 12 merchants...");
    for id in 1..=12 {
        writes
            .create(merchant(id, &tenant, &format!("Vendor {:02}", id), 2))
            .await?;
    }
    println!("   ✓ {} rows committed\n", writes.repository().len());

    // 2. Miss then hit
    println!("2. Reading merchant 7 twice:");
    let by_id = ById::<Merchant>::new(7, tenant.clone());
    for _ in 0..2 {
        if let Some(dto) = reads.first_or_default(&by_id, writes.repository()).await? {
            println!("   ✓ {} (tier {})", dto.name, dto.risk_tier);
        }
    }
    println!(
        "   primary store queried {} time(s)\n",
        writes.repository().query_count()
    );

    // 3. Paged listing
    println!("3. Page 2 of 5:");
    let page = reads
        .get_paged_result(&ListPaged::<Merchant>::new(tenant.clone()), writes.repository(), 2, 5)
        .await?;
    println!(
        "   ✓ {} items, total {}, {} pages\n",
        page.items.len(),
        page.total_count,
        page.total_pages
    );

    // 4. Update invalidates every cached view of the merchant
    println!("4. Raising merchant 7 to tier 1:");
    println!("   cached entries before: {}", cache.len().await);
    writes.update(merchant(7, &tenant, "Vendor 07", 1)).await?;
    println!("   cached entries after:  {}", cache.len().await);
    let key = by_id.cache_key(ReadOperation::FirstOrDefault).render();
    println!("   by-id entry present: {}", cache.exists(&key).await?);

    if let Some(dto) = reads.first_or_default(&by_id, writes.repository()).await? {
        println!("   ✓ re-read: {} (tier {})\n", dto.name, dto.risk_tier);
    }

    // 5. Fresh reads never touch the primary store
    println!("5. Fresh strategy for an uncached merchant:");
    let missing = ById::<Merchant>::new(99, tenant.clone());
    match reads
        .first_or_default_with_strategy(&missing, writes.repository(), CacheStrategy::Fresh)
        .await
    {
        Err(Error::CacheMiss) => println!("   ✓ cache only: miss, primary store untouched\n"),
        other => println!("   ✓ cache only: {:?}\n", other.map(|dto| dto.is_some())),
    }

    // 6. Delete
    println!("6. Deleting merchant 3:");
    let existed = writes.delete(3).await?;
    println!("   ✓ existed: {}, rows left: {}\n", existed, writes.repository().len());

    cache.log_stats().await;
    let snapshot = metrics.snapshot();
    println!(
        "Cache metrics: {} hits, {} misses, {} sets",
        snapshot.hits, snapshot.misses, snapshot.sets
    );
    Ok(())
}
