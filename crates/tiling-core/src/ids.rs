//! Strongly-typed identifiers for cluster instances and cache jobs.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

macro_rules! define_string_id {
    ($name:ident) => {
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

define_string_id!(InstanceId);
define_string_id!(JobId);

impl InstanceId {
    /// Generates an id from the host name plus a random suffix, for processes
    /// that are not given an explicit identity.
    pub fn generate(host: &str) -> Self {
        let suffix = Uuid::new_v4().simple().to_string();
        Self(format!("{}-{}", host, &suffix[..8]))
    }

    /// The id as a single subject token: separators and wildcards of the
    /// transport's subject syntax are replaced with `_`.
    pub fn subject_token(&self) -> String {
        self.0
            .chars()
            .map(|c| match c {
                '.' | '*' | '>' | ' ' | '\t' => '_',
                other => other,
            })
            .collect()
    }
}

impl JobId {
    /// Mints a job id namespaced by the originating instance.
    ///
    /// The layout is `<instance>-<seq>-<random>`: the prefix and the per-process
    /// sequence keep ids readable, the random tail keeps them unique across
    /// restarts of the same instance.
    pub fn generate(instance: &InstanceId, seq: u64) -> Self {
        let random = Uuid::new_v4().simple().to_string();
        Self(format!("{}-{:06}-{}", instance, seq, &random[..8]))
    }

    /// The instance prefix of a generated id, if the id has that shape.
    pub fn origin(&self) -> Option<&str> {
        let mut parts = self.0.rsplitn(3, '-');
        let _random = parts.next()?;
        let seq = parts.next()?;
        let origin = parts.next()?;
        seq.chars().all(|c| c.is_ascii_digit()).then_some(origin)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_id_is_namespaced_by_instance() {
        let instance = InstanceId::new("gwc-1");
        let id = JobId::generate(&instance, 7);
        assert!(id.as_str().starts_with("gwc-1-000007-"));
        assert_eq!(id.origin(), Some("gwc-1"));
    }

    #[test]
    fn test_job_ids_do_not_collide_for_same_sequence() {
        let instance = InstanceId::new("gwc-1");
        assert_ne!(JobId::generate(&instance, 1), JobId::generate(&instance, 1));
    }

    #[test]
    fn test_origin_of_free_form_id() {
        assert_eq!(JobId::new("seed-layerX-epsg900913-png").origin(), None);
    }

    #[test]
    fn test_subject_token() {
        let id = InstanceId::new("host.example.com:8080");
        assert_eq!(id.subject_token(), "host_example_com:8080");
    }

    #[test]
    fn test_generated_instance_id() {
        let id = InstanceId::generate("tiles01");
        assert!(id.as_str().starts_with("tiles01-"));
        assert_eq!(id.as_str().len(), "tiles01-".len() + 8);
    }
}
