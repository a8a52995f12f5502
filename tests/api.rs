//! Public-surface tests that need no privileges and no network rounds.

use multiping::{
    AddressFamily, InfoField, OptionValue, PingEngine, PingError, PingOption, DEFAULT_PAYLOAD_LEN,
    DEFAULT_TIMEOUT, DEFAULT_TTL,
};

#[test]
fn documented_defaults_are_exposed() {
    let engine = PingEngine::new();
    assert_eq!(
        OptionValue::Seconds(DEFAULT_TIMEOUT.as_secs_f64()),
        engine.option(PingOption::Timeout)
    );
    assert_eq!(
        OptionValue::Integer(i64::from(DEFAULT_TTL)),
        engine.option(PingOption::Ttl)
    );
    assert_eq!(
        OptionValue::Family(AddressFamily::Any),
        engine.option(PingOption::AddressFamily)
    );
    match engine.option(PingOption::Data) {
        OptionValue::Bytes(payload) => assert_eq!(DEFAULT_PAYLOAD_LEN, payload.len()),
        other => panic!("unexpected value: {other:?}"),
    }
}

#[test]
fn registry_misuse_is_surfaced_synchronously() {
    let mut engine = PingEngine::new();
    engine.add_host("127.0.0.1").unwrap();
    assert!(matches!(
        engine.add_host("127.0.0.1"),
        Err(PingError::DuplicateHost(_))
    ));
    assert!(matches!(
        engine.remove_host("203.0.113.5"),
        Err(PingError::UnknownHost(_))
    ));
    engine.remove_host("127.0.0.1").unwrap();
    assert!(matches!(engine.send(), Err(PingError::NoHostsRegistered)));
}

#[test]
fn iteration_follows_insertion_order_without_a_round() {
    let mut engine = PingEngine::new();
    for host in ["10.0.0.3", "10.0.0.1", "10.0.0.2"] {
        engine.add_host(host).unwrap();
    }
    engine.remove_host("10.0.0.1").unwrap();
    engine.add_host("10.0.0.4").unwrap();

    let names: Vec<String> = engine.iter().map(|h| h.hostname().to_string()).collect();
    assert_eq!(vec!["10.0.0.3", "10.0.0.2", "10.0.0.4"], names);

    let mut iter = engine.iter();
    assert!(iter.next().is_some());
    iter.rewind();
    assert_eq!(3, iter.count());
}

#[test]
fn numeric_codes_drive_the_surface_like_an_embedding_would() {
    // Embedding layers drive the engine with integer constants; unknown
    // codes must fail before anything else happens.
    assert!(matches!(
        PingOption::from_code(0x1234),
        Err(PingError::InvalidOption(0x1234))
    ));
    assert!(matches!(
        InfoField::from_code(42),
        Err(PingError::UnknownField(42))
    ));
    assert_eq!(PingOption::Timeout, PingOption::from_code(0x01).unwrap());
    assert_eq!(InfoField::Dropped, InfoField::from_code(9).unwrap());
}

#[test]
fn two_phase_retrieval_loops_to_success() {
    let mut engine = PingEngine::new();
    engine.add_host("127.0.0.1").unwrap();
    let host = engine.iter().next().unwrap();

    let mut capacity = 0;
    let value = loop {
        match host.get_info(InfoField::Address, capacity) {
            Ok(value) => break value,
            Err(PingError::BufferTooSmall { required }) => capacity = required,
            Err(other) => panic!("unexpected error: {other}"),
        }
    };
    assert_eq!(
        multiping::InfoValue::Text("127.0.0.1".to_string()),
        value
    );
    assert_eq!("127.0.0.1".len(), capacity);
}
