//! `service-splitter` entries.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::entry::SERVICE_SPLITTER;
use crate::error::{ConfigError, ConfigResult};
use crate::headers::HttpHeaderModifiers;
use crate::service::{EnterpriseMeta, ServiceID};

/// Weighted traffic split for one service.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServiceSplitterConfigEntry {
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub namespace: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub partition: String,
    #[serde(default)]
    pub splits: Vec<ServiceSplit>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub meta: BTreeMap<String, String>,
}

/// One leg of a split. Empty destination fields inherit from the splitter.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServiceSplit {
    /// Percentage of traffic, 0 to 100, with two decimal places of precision.
    pub weight: f32,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub service: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub service_subset: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub namespace: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub partition: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_headers: Option<HttpHeaderModifiers>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_headers: Option<HttpHeaderModifiers>,
}

impl ServiceSplit {
    /// Tenancy of the split destination, falling back to `parent`.
    pub fn enterprise_meta(&self, parent: &EnterpriseMeta) -> EnterpriseMeta {
        EnterpriseMeta::new(
            if self.namespace.is_empty() {
                parent.namespace.clone()
            } else {
                self.namespace.clone()
            },
            if self.partition.is_empty() {
                parent.partition.clone()
            } else {
                self.partition.clone()
            },
        )
    }

    /// Copy of this split with header handling from `parent` merged in
    /// wherever this split does not override it.
    pub fn merge_parent(&self, parent: &ServiceSplit) -> ServiceSplit {
        let mut merged = self.clone();
        merged.request_headers = HttpHeaderModifiers::merge(
            parent.request_headers.as_ref(),
            self.request_headers.as_ref(),
        );
        merged.response_headers = HttpHeaderModifiers::merge(
            parent.response_headers.as_ref(),
            self.response_headers.as_ref(),
        );
        merged
    }
}

/// Weight scaled to hundredths of a percent.
pub fn scale_split_weight(weight: f32) -> i64 {
    (f64::from(weight) * 100.0).round() as i64
}

/// Round a weight to the two decimal places splits carry.
pub fn normalize_split_weight(weight: f32) -> f32 {
    scale_split_weight(weight) as f32 / 100.0
}

impl ServiceSplitterConfigEntry {
    pub fn enterprise_meta(&self) -> EnterpriseMeta {
        EnterpriseMeta::new(self.namespace.clone(), self.partition.clone())
    }

    pub fn service_id(&self) -> ServiceID {
        ServiceID::new(self.name.clone(), &self.enterprise_meta())
    }

    pub fn validate(&self) -> ConfigResult<()> {
        let invalid = |reason: String| ConfigError::invalid(SERVICE_SPLITTER, &self.name, reason);

        if self.name.is_empty() {
            return Err(invalid("name is required".to_string()));
        }
        if self.splits.is_empty() {
            return Err(invalid("no splits configured".to_string()));
        }

        let mut sum_scaled = 0;
        for (i, split) in self.splits.iter().enumerate() {
            if !(0.0..=100.0).contains(&split.weight) {
                return Err(invalid(format!(
                    "Splits[{i}] weight {} is not between 0 and 100",
                    split.weight
                )));
            }
            sum_scaled += scale_split_weight(split.weight);
        }

        if sum_scaled != 10_000 {
            return Err(invalid(format!(
                "the sum of all split weights must be 100, not {:.2}",
                sum_scaled as f32 / 100.0
            )));
        }

        Ok(())
    }
}
