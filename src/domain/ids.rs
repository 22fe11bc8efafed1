use uuid::Uuid;

/// Generate a prefixed short identifier, e.g. `job_1f0c9a2b44`.
///
/// Ten hex characters of a v4 UUID are plenty for a single-coordinator
/// deployment while keeping ids readable in logs and the state document.
pub fn new_id(prefix: &str) -> String {
    let hex = Uuid::new_v4().simple().to_string();
    format!("{prefix}_{}", &hex[..10])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_id_is_prefixed_and_short() {
        let id = new_id("itm");
        assert!(id.starts_with("itm_"));
        assert_eq!(id.len(), "itm_".len() + 10);
        assert!(id[4..].chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn new_id_is_unique_enough() {
        let a = new_id("job");
        let b = new_id("job");
        assert_ne!(a, b);
    }
}
