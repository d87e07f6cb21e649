//! CLI Module Tests
//!
//! ## Test Scopes
//! - **Modes**: Hub vs join selection and the conflicting combination.
//! - **Flags**: Unit arguments and node configuration.

#[cfg(test)]
mod tests {
    use crate::cli::{CliArgs, Mode, UnitArg};

    use std::time::Duration;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|arg| arg.to_string()).collect()
    }

    // ============================================================
    // MODE TESTS
    // ============================================================

    #[test]
    fn test_hub_mode() {
        let parsed = CliArgs::parse(&args(&["--hub-listen", "127.0.0.1:7000"])).unwrap();
        assert_eq!(parsed.mode, Mode::Hub("127.0.0.1:7000".to_string()));
    }

    #[test]
    fn test_join_mode() {
        let parsed = CliArgs::parse(&args(&["--hub", "127.0.0.1:7000", "--name", "b"])).unwrap();

        assert_eq!(parsed.mode, Mode::Join("127.0.0.1:7000".to_string()));
        assert_eq!(parsed.name.as_deref(), Some("b"));
    }

    #[test]
    fn test_hub_and_join_rejected_together() {
        let err = CliArgs::parse(&args(&[
            "--hub-listen",
            "127.0.0.1:7000",
            "--hub",
            "127.0.0.1:7001",
        ]))
        .unwrap_err();

        assert!(err.to_string().contains("cannot be used together"));
    }

    #[test]
    fn test_mode_required() {
        assert!(CliArgs::parse(&args(&["--unit", "a1"])).is_err());
    }

    #[test]
    fn test_missing_value() {
        let err = CliArgs::parse(&args(&["--hub"])).unwrap_err();
        assert!(err.to_string().contains("--hub needs a value"));
    }

    // ============================================================
    // FLAG TESTS
    // ============================================================

    #[test]
    fn test_units_and_config() {
        let parsed = CliArgs::parse(&args(&[
            "--hub",
            "10.0.0.1:7000",
            "--unit",
            "b1=a1, c1",
            "--unit",
            "b2",
            "--port-base",
            "30000",
            "--listen-host",
            "127.0.0.1",
            "--rpc-timeout-ms",
            "250",
            "--http",
            "127.0.0.1:8080",
        ]))
        .unwrap();

        assert_eq!(
            parsed.units,
            vec![
                UnitArg {
                    id: "b1".to_string(),
                    depends: vec!["a1".to_string(), "c1".to_string()],
                },
                UnitArg {
                    id: "b2".to_string(),
                    depends: vec![],
                },
            ]
        );
        assert_eq!(parsed.config.hub_port_base, 30000);
        assert_eq!(parsed.config.listen_host, "127.0.0.1");
        assert_eq!(parsed.config.rpc_timeout, Some(Duration::from_millis(250)));
        assert_eq!(parsed.http_addr, Some("127.0.0.1:8080".parse().unwrap()));
    }

    #[test]
    fn test_unit_without_id_rejected() {
        assert!(UnitArg::parse("=a1").is_err());
    }

    #[test]
    fn test_bad_port_rejected() {
        assert!(CliArgs::parse(&args(&["--hub", "h:1", "--port-base", "70000"])).is_err());
    }
}
