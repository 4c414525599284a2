use crate::db_types::OrderId;

pub const DEFAULT_NAMESPACE: &str = "bundl:";

/// The cache key family for one process-wide namespace.
///
/// * `{ns}order:{id}`: serialized order snapshot, TTL-bound.
/// * `{ns}order:{id}:participants`: set of user ids that have ever pledged, TTL-bound.
/// * `{ns}order:{id}:completed`: marker left behind by the pledge script when completion removes the snapshot, so
///   that later pledges can tell a completed order apart from one whose TTL fired.
/// * `{ns}orders:geo`: geo-indexed set whose members are `{ns}order:{id}` keys.
#[derive(Debug, Clone)]
pub struct KeyFamily {
    namespace: String,
}

impl Default for KeyFamily {
    fn default() -> Self {
        Self::new(DEFAULT_NAMESPACE)
    }
}

impl KeyFamily {
    pub fn new(namespace: impl Into<String>) -> Self {
        Self { namespace: namespace.into() }
    }

    pub fn order_key(&self, order_id: &OrderId) -> String {
        format!("{}order:{}", self.namespace, order_id.as_str())
    }

    pub fn participants_key(&self, order_id: &OrderId) -> String {
        format!("{}order:{}:participants", self.namespace, order_id.as_str())
    }

    pub fn completed_key(&self, order_id: &OrderId) -> String {
        format!("{}order:{}:completed", self.namespace, order_id.as_str())
    }

    pub fn geo_key(&self) -> String {
        format!("{}orders:geo", self.namespace)
    }

    /// Extracts the order id from an `{ns}order:{id}` key. Participant-set keys and keys from other namespaces
    /// return `None`, so the expiry watcher only ever reacts to snapshot expirations.
    pub fn order_id_from_key(&self, key: &str) -> Option<OrderId> {
        let rest = key.strip_prefix(&self.namespace)?.strip_prefix("order:")?;
        if rest.is_empty() || rest.contains(':') {
            return None;
        }
        Some(OrderId(rest.to_string()))
    }
}
