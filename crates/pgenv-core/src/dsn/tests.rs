//! Tests for DSN assembly

use std::collections::HashMap;

use pretty_assertions::assert_eq;
use rstest::rstest;
use serial_test::serial;
use url::Url;

use super::*;
use crate::options::*;

fn builder(vars: &[(&str, &str)]) -> DsnBuilder<'static> {
    let vars: HashMap<String, String> = vars
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    DsnBuilder::with_lookup(move |name| vars.get(name).cloned()).processing_units(|| 2)
}

fn query_of(dsn: &str) -> HashMap<String, String> {
    let url = Url::parse(dsn).expect("DSN should be a valid URI");
    url.query_pairs().into_owned().collect()
}

// =============================================================================
// Defaults
// =============================================================================

#[test]
fn test_build_with_empty_environment() {
    let dsn = builder(&[]).build();

    assert_eq!(
        dsn,
        "postgresql://localhost?connect_timeout=10&pool_max_conns=4&pool_min_conns=1&port=5432"
    );
}

#[test]
fn test_scheme_and_host_defaults() {
    let url = Url::parse(&builder(&[]).build()).unwrap();
    assert_eq!(url.scheme(), "postgresql");
    assert_eq!(url.host_str(), Some("localhost"));
}

#[rstest]
#[case::absent(None, "5432")]
#[case::empty(Some(""), "5432")]
#[case::blank(Some("   "), "5432")]
#[case::provided(Some("6432"), "6432")]
#[case::verbatim(Some("not-a-port"), "not-a-port")]
fn test_port_resolution(#[case] port: Option<&str>, #[case] expected: &str) {
    let vars: Vec<(&str, &str)> = port.map(|p| vec![(PGPORT, p)]).unwrap_or_default();
    let query = query_of(&builder(&vars).build());
    assert_eq!(query.get("port").map(String::as_str), Some(expected));
}

#[rstest]
#[case::empty("")]
#[case::blank("  \t ")]
fn test_blank_host_defaults_to_localhost(#[case] host: &str) {
    let url = Url::parse(&builder(&[(PGHOST, host)]).build()).unwrap();
    assert_eq!(url.host_str(), Some("localhost"));
}

#[test]
fn test_max_connections_default_tracks_processing_units() {
    let few = query_of(&builder(&[]).processing_units(|| 1).build());
    assert_eq!(few["pool_max_conns"], "4");

    let many = query_of(&builder(&[]).processing_units(|| 32).build());
    assert_eq!(many["pool_max_conns"], "32");
}

// =============================================================================
// Empty parameter omission
// =============================================================================

#[test]
fn test_blank_values_are_omitted() {
    let dsn = builder(&[
        (PGUSER, ""),
        (PGPASSWORD, "   "),
        (PGAPPNAME, "\n"),
        (PGSSLMODE, ""),
        (PGSSLCERTMODE, " "),
        (PGSSLROOTCERT, ""),
    ])
    .build();

    for key in [
        "user",
        "password",
        "application_name",
        "sslmode",
        "sslcertmode",
        "sslrootcert",
    ] {
        assert!(!dsn.contains(&format!("{key}=")), "{key} should be omitted: {dsn}");
    }
    assert!(query_of(&dsn).values().all(|v| !v.trim().is_empty()));
}

#[test]
fn test_all_keys_present_when_set() {
    let dsn = builder(&[
        (PGHOST, "db.example.com"),
        (PGUSER, "app"),
        (PGPASSWORD, "p@ss word&more"),
        (PGPORT, "5433"),
        (PGCONNECT_TIMEOUT, "3"),
        (PGAPPNAME, "billing api"),
        (PGSSLMODE, "verify-full"),
        (PGSSLCERTMODE, "disable"),
        (PGSSLROOTCERT, "/etc/ssl/root.crt"),
        (PGPOOLMAXCONNECTIONS, "20"),
        (PGPOOLMINCONNECTIONS, "2"),
        (PGTZ, "Asia/Tokyo"),
    ])
    .build();

    let url = Url::parse(&dsn).unwrap();
    assert_eq!(url.host_str(), Some("db.example.com"));

    let query = query_of(&dsn);
    assert_eq!(query.len(), 10);
    assert_eq!(query["user"], "app");
    assert_eq!(query["password"], "p@ss word&more");
    assert_eq!(query["port"], "5433");
    assert_eq!(query["connect_timeout"], "3");
    assert_eq!(query["application_name"], "billing api");
    assert_eq!(query["sslmode"], "verify-full");
    assert_eq!(query["sslcertmode"], "disable");
    assert_eq!(query["sslrootcert"], "/etc/ssl/root.crt");
    assert_eq!(query["pool_max_conns"], "20");
    assert_eq!(query["pool_min_conns"], "2");
    assert!(!query.contains_key("timezone"));
}

// =============================================================================
// Host encoding
// =============================================================================

#[rstest]
#[case::name_with_port("db:6543", "postgresql://db:6543?")]
#[case::ipv6("::1", "postgresql://[::1]?")]
#[case::bracketed_ipv6("[::1]", "postgresql://[::1]?")]
#[case::bracketed_ipv6_with_port("[::1]:6543", "postgresql://[::1]:6543?")]
#[case::socket_dir("/var/run/postgresql", "postgresql://%2Fvar%2Frun%2Fpostgresql?")]
#[case::userinfo_lookalike("evil@host", "postgresql://evil%40host?")]
fn test_host_encoding(#[case] host: &str, #[case] prefix: &str) {
    let dsn = builder(&[(PGHOST, host)]).build();
    assert!(dsn.starts_with(prefix), "{dsn}");
    assert_eq!(Url::parse(&dsn).unwrap().scheme(), "postgresql");
}

#[rstest]
#[case("a:1,b:2")]
#[case("host with spaces")]
#[case("host?#frag")]
#[case("ünïcödé")]
#[case(":::")]
#[case("x:99999")]
fn test_unusual_hosts_still_produce_valid_uris(#[case] host: &str) {
    let dsn = builder(&[(PGHOST, host)]).build();
    let url = Url::parse(&dsn).expect("valid URI");
    assert_eq!(url.scheme(), "postgresql");
    assert!(url.query_pairs().any(|(k, _)| k == "port"));
}

#[test]
fn test_render_without_query() {
    let options = ConnectionOptions {
        host: "db".into(),
        user: String::new(),
        password: String::new(),
        port: String::new(),
        connect_timeout: String::new(),
        application_name: String::new(),
        sslmode: String::new(),
        sslcertmode: String::new(),
        sslrootcert: String::new(),
        pool_max_conns: String::new(),
        pool_min_conns: String::new(),
        timezone: String::new(),
    };
    assert_eq!(render_dsn(&options), "postgresql://db");
}

// =============================================================================
// Environment warnings
// =============================================================================

#[test]
fn test_check_variables_disabled_by_default() {
    let issues = builder(&[(PGUSER, "")]).watch([PGUSER, PGPASSWORD]).check_variables();
    assert!(issues.is_empty());
}

#[test]
fn test_check_variables_reports_missing_and_empty() {
    let issues = builder(&[(PGUSER, " "), (PGHOST, "db")])
        .watch([PGUSER, PGPASSWORD, PGHOST])
        .warn_on_missing(true)
        .warn_on_empty(true)
        .check_variables();

    assert_eq!(
        issues,
        vec![
            EnvIssue::Empty(PGUSER.to_string()),
            EnvIssue::Missing(PGPASSWORD.to_string()),
        ]
    );
}

#[test]
fn test_check_variables_only_enabled_kinds() {
    let issues = builder(&[(PGUSER, "")])
        .watch(ENVIRONMENT_VARIABLES)
        .warnings(EnvWarnings {
            empty: true,
            missing: false,
        })
        .check_variables();

    assert_eq!(issues, vec![EnvIssue::Empty(PGUSER.to_string())]);
}

// =============================================================================
// Process environment
// =============================================================================

#[test]
#[serial]
fn test_build_dsn_reads_process_environment() {
    // SAFETY: serialized with every other test that touches the environment
    unsafe {
        for name in ENVIRONMENT_VARIABLES {
            std::env::remove_var(name);
        }
        std::env::set_var(PGHOST, "env-host");
        std::env::set_var(PGUSER, "env-user");
        std::env::set_var(PGPORT, "");
    }

    let dsn = build_dsn();

    unsafe {
        std::env::remove_var(PGHOST);
        std::env::remove_var(PGUSER);
        std::env::remove_var(PGPORT);
    }

    let url = Url::parse(&dsn).unwrap();
    assert_eq!(url.host_str(), Some("env-host"));
    let query = query_of(&dsn);
    assert_eq!(query["user"], "env-user");
    assert_eq!(query["port"], "5432");
    assert_eq!(
        query["pool_max_conns"],
        default_max_connections(processing_units()).to_string()
    );
}

#[test]
fn test_timezone_does_not_reach_pool_settings() {
    let dsn = builder(&[(PGTZ, "Asia/Tokyo")]).build();
    assert_eq!(builder(&[(PGTZ, "Asia/Tokyo")]).options().timezone, "Asia/Tokyo");

    let settings = crate::PoolSettings::parse_with_units(&dsn, 2).unwrap();
    assert!(settings.runtime_params.is_empty(), "{:?}", settings.runtime_params);
}
