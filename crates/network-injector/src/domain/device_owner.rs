/// Derives the device owner string stamped on injector ports.
///
/// The same value is used as the list filter, so a port created by this
/// controller is always found again by it.
pub fn device_owner(network_tag: &str) -> String {
    format!("network:{network_tag}-injector")
}

#[cfg(test)]
mod tests {
    use similar_asserts::assert_eq;

    use super::*;

    #[test]
    fn device_owner_wraps_tag() {
        assert_eq!(device_owner("injected"), "network:injected-injector");
    }

    #[test]
    fn device_owner_is_deterministic() {
        assert_eq!(device_owner("dns"), device_owner("dns"));
        assert!(device_owner("dns") != device_owner("ntp"));
    }
}
