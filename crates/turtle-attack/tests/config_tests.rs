use std::sync::Arc;
use std::time::Duration;

use hyper::Method;
use turtle_attack::telemetry::bus::DEFAULT_QUEUE_CAPACITY;
use turtle_attack::telemetry::NoopHandler;
use turtle_attack::{Attack, AttackError, Target};
use turtle_common::{AttackConfig, Config};

fn parse(yaml: &str) -> Config {
    serde_yaml::from_str(yaml).unwrap()
}

#[test]
fn test_parse_slowloris_config() {
    let config = parse(
        r#"
target:
  url: "http://127.0.0.1:8080/login?next=/"
  duration_ms: 1500
  connections: 250
attack:
  kind: slowloris
  method: post
  send_gibberish: true
  gibberish_interval_ms: 500
  user_agents:
    - "turtle/0.1"
"#,
    );

    assert_eq!(config.telemetry.queue_capacity, DEFAULT_QUEUE_CAPACITY);
    assert!(!config.metrics.enabled);

    let attack = Attack::from_config(&config, Arc::new(NoopHandler)).unwrap();
    assert_eq!(attack.name(), "slowloris");
    assert_eq!(attack.target().duration, Duration::from_millis(1500));
    assert_eq!(attack.target().connections, 250);
    assert_eq!(attack.target().request_path(), "/login?next=/");

    let Attack::Slowloris(mut slowloris) = attack else {
        panic!("expected a slowloris attack");
    };
    assert_eq!(slowloris.method, Some(Method::POST));
    assert!(slowloris.send_gibberish);
    assert_eq!(slowloris.gibberish_interval, Duration::from_millis(500));

    slowloris.resolve_defaults();
    assert_eq!(slowloris.user_agents, vec!["turtle/0.1".to_string()]);
    assert_eq!(slowloris.write_timeout, Duration::from_secs(10));
}

#[test]
fn test_parse_slow_body_config() {
    let config = parse(
        r#"
target:
  url: "http://example.com"
attack:
  kind: slow_body_read
  body_read_timeout_ms: 2000
telemetry:
  queue_capacity: 64
metrics:
  enabled: true
  port: 9100
"#,
    );

    assert!(matches!(config.attack, AttackConfig::SlowBodyRead(_)));
    assert_eq!(config.telemetry.queue_capacity, 64);
    assert!(config.metrics.enabled);
    assert_eq!(config.metrics.port, 9100);

    let attack = Attack::from_config(&config, Arc::new(NoopHandler)).unwrap();
    assert_eq!(attack.name(), "slow-body-read");

    let Attack::SlowBodyRead(mut slow_body) = attack else {
        panic!("expected a slow body read attack");
    };
    assert_eq!(slow_body.method, None);
    assert_eq!(slow_body.body_read_timeout, Duration::from_secs(2));

    slow_body.resolve_defaults();
    assert_eq!(slow_body.method, Some(Method::POST));
    assert_eq!(slow_body.target.duration, Duration::from_secs(30));
    assert_eq!(slow_body.target.connections, 100);
}

#[test]
fn test_invalid_method_is_rejected() {
    let config = parse(
        r#"
target:
  url: "http://example.com"
attack:
  kind: slowloris
  method: "GE T"
"#,
    );

    let err = Attack::from_config(&config, Arc::new(NoopHandler)).unwrap_err();
    assert!(matches!(err, AttackError::InvalidMethod(m) if m == "GE T"));
}

#[test]
fn test_invalid_url_is_rejected() {
    let config = parse(
        r#"
target:
  url: "http://exa mple.com"
attack:
  kind: slow_body_read
"#,
    );

    let err = Attack::from_config(&config, Arc::new(NoopHandler)).unwrap_err();
    assert!(matches!(err, AttackError::InvalidTarget(_)));
}

#[test]
fn test_unknown_attack_kind_fails_to_parse() {
    let res: Result<Config, _> = serde_yaml::from_str(
        r#"
target:
  url: "http://example.com"
attack:
  kind: flood
"#,
    );
    assert!(res.is_err());
}

#[test]
fn test_dial_addr_default_ports() {
    let http = Target::new("http://example.com/a".parse().unwrap());
    assert_eq!(http.dial_addr().unwrap(), "example.com:80");
    assert_eq!(http.host_header(), "example.com");

    let https = Target::new("https://example.com".parse().unwrap());
    assert_eq!(https.dial_addr().unwrap(), "example.com:443");
    assert_eq!(https.request_path(), "/");

    let explicit = Target::new("http://10.0.0.1:8081".parse().unwrap());
    assert_eq!(explicit.dial_addr().unwrap(), "10.0.0.1:8081");
    assert_eq!(explicit.host_header(), "10.0.0.1:8081");
}
