//! Index settings applied when an index is created.
//!
//! Every string field is analysed by one custom analyzer:
//!
//! ```text
//! html_strip → standard tokenizer → lowercase → asciifolding → english stop → word_delimiter
//! ```
//!
//! and also kept as a `keyword` sub-field (`<field>.raw`) for exact matches
//! and sorting.

use serde_json::{json, Value};

pub const ANALYZER: &str = "compliance_text";

/// Longest string kept in the `.raw` keyword sub-field.
pub const RAW_IGNORE_ABOVE: u32 = 256;

/// Settings and mappings body for index creation.
pub fn index_settings() -> Value {
    json!({
        "settings": {
            "analysis": {
                "char_filter": {
                    "strip_html": { "type": "html_strip" }
                },
                "filter": {
                    "english_stop": { "type": "stop", "stopwords": "_english_" },
                    "split_words": { "type": "word_delimiter" }
                },
                "analyzer": {
                    ANALYZER: {
                        "type": "custom",
                        "char_filter": ["strip_html"],
                        "tokenizer": "standard",
                        "filter": ["lowercase", "asciifolding", "english_stop", "split_words"]
                    }
                }
            }
        },
        "mappings": {
            "dynamic_templates": [
                {
                    "strings": {
                        "match_mapping_type": "string",
                        "mapping": {
                            "type": "text",
                            "analyzer": ANALYZER,
                            "fields": {
                                "raw": { "type": "keyword", "ignore_above": RAW_IGNORE_ABOVE }
                            }
                        }
                    }
                }
            ]
        }
    })
}
