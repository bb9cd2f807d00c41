use super::*;

#[test]
fn display_prefixes_are_stable() {
    assert!(
        StrataError::validation("x")
            .to_string()
            .contains("validation error:")
    );
    assert!(
        StrataError::configuration("x")
            .to_string()
            .contains("configuration error:")
    );
    assert!(
        StrataError::encoder("x")
            .to_string()
            .contains("encoder error:")
    );
    assert!(
        StrataError::surface("x")
            .to_string()
            .contains("surface error:")
    );
    assert!(
        StrataError::serde("x")
            .to_string()
            .contains("serialization error:")
    );
}

#[test]
fn other_preserves_source() {
    let base = std::io::Error::other("boom");
    let err = StrataError::Other(anyhow::Error::new(base));
    assert!(err.to_string().contains("boom"));
}

#[test]
fn panic_message_reads_str_and_string_payloads() {
    let p = std::panic::catch_unwind(|| panic!("static text")).unwrap_err();
    assert_eq!(panic_message(p.as_ref()), "static text");
    let p = std::panic::catch_unwind(|| panic!("formatted {}", 7)).unwrap_err();
    assert_eq!(panic_message(p.as_ref()), "formatted 7");
    let p = std::panic::catch_unwind(|| std::panic::panic_any(3_u8)).unwrap_err();
    assert_eq!(panic_message(p.as_ref()), "unknown panic");
}
