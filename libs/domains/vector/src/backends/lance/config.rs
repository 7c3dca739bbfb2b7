use core_config::EnvReader;

use crate::error::{VectorError, VectorResult};

pub const DEFAULT_LANCE_URI: &str = "./data/vectors";

/// Embedded LanceDB table settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LanceConfig {
    /// Directory (or object store URI) holding the dataset.
    pub uri: String,
    pub table_name: String,
}

impl LanceConfig {
    pub fn new(uri: impl Into<String>, table_name: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            table_name: table_name.into(),
        }
    }

    /// `URI` (default `./data/vectors`) and `COLLECTION_NAME` (required).
    pub fn read_env(env: &mut EnvReader) -> Self {
        Self {
            uri: env.or_default("URI", DEFAULT_LANCE_URI),
            table_name: env.required("COLLECTION_NAME"),
        }
    }

    pub fn validate(&self) -> VectorResult<()> {
        let mut fields = Vec::new();
        if self.uri.trim().is_empty() {
            fields.push("uri".to_string());
        }
        if !is_valid_table_name(&self.table_name) {
            fields.push("table_name".to_string());
        }
        if fields.is_empty() {
            Ok(())
        } else {
            Err(VectorError::configuration("local", fields))
        }
    }
}

/// LanceDB accepts letters, digits, `_`, `-` and `.` in table names.
fn is_valid_table_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
}
