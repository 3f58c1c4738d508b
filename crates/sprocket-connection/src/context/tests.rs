//! Tests for connection lifecycle

use super::*;
use crate::testing::{Event, Mock, init_tracing};
use pretty_assertions::assert_eq;
use rstest::rstest;

#[rstest]
#[case::closed(ConnectionState::Closed)]
#[case::broken(ConnectionState::Broken)]
fn test_validate_opens_exactly_once(#[case] initial: ConnectionState) {
    init_tracing();
    let mock = Mock::new(initial);
    let mut context = ConnectionContext::from_connection(mock.connection());

    context.validate_connection_state().unwrap();

    assert_eq!(mock.count(&Event::Open), 1);
    assert_eq!(context.state(), ConnectionState::Open);
}

#[test]
fn test_validate_leaves_open_connection_untouched() {
    let mock = Mock::new(ConnectionState::Open);
    let mut context = ConnectionContext::from_connection(mock.connection());

    context.validate_connection_state().unwrap();
    context.validate_connection_state().unwrap();

    assert!(mock.events().is_empty());
    assert_eq!(context.state(), ConnectionState::Open);
}

#[test]
fn test_validate_propagates_open_failure_without_retry() {
    let mock = Mock::new(ConnectionState::Closed);
    mock.configure(|s| s.open_error = Some(SprocketError::Driver("login failed".into())));
    let mut context = ConnectionContext::from_connection(mock.connection());

    let err = context.validate_connection_state().unwrap_err();

    assert!(matches!(err, SprocketError::Driver(ref m) if m == "login failed"));
    assert_eq!(mock.count(&Event::Open), 1);
    assert_eq!(context.state(), ConnectionState::Closed);
}

#[test]
fn test_create_opens_eagerly() {
    let mock = Mock::new(ConnectionState::Closed);
    let config = ConnectionConfig::new("mock", "orders");

    let context = ConnectionContext::create(&mock.driver(), &config).unwrap();

    assert_eq!(context.state(), ConnectionState::Open);
    assert_eq!(context.driver_name(), Some("mock"));
    assert_eq!(mock.events(), vec![Event::Open]);
}

#[test]
fn test_create_closes_handle_when_open_fails() {
    let mock = Mock::new(ConnectionState::Closed);
    mock.configure(|s| s.open_error = Some(SprocketError::Timeout("connect".into())));
    let config = ConnectionConfig::new("mock", "orders");

    let err = ConnectionContext::create(&mock.driver(), &config).unwrap_err();

    assert!(matches!(err, SprocketError::Timeout(_)));
    assert_eq!(mock.events(), vec![Event::Open, Event::Close]);
}

#[test]
fn test_connect_unknown_driver() {
    let config = ConnectionConfig::new("oracle", "legacy");
    let err = ConnectionContext::connect(&config).unwrap_err();
    assert!(matches!(err, SprocketError::Configuration(_)));
}

#[test]
fn test_dispose_is_idempotent() {
    let mock = Mock::new(ConnectionState::Open);
    let mut context = ConnectionContext::from_connection(mock.connection());

    context.dispose();
    assert!(context.is_disposed());
    assert_eq!(context.state(), ConnectionState::Absent);
    assert_eq!(context.driver_name(), None);

    context.dispose();
    assert_eq!(mock.count(&Event::Close), 1);
}

#[test]
fn test_dispose_swallows_close_error() {
    let mock = Mock::new(ConnectionState::Open);
    mock.configure(|s| s.close_error = Some(SprocketError::Driver("socket reset".into())));
    let mut context = ConnectionContext::from_connection(mock.connection());

    context.dispose();

    assert!(context.is_disposed());
    assert_eq!(context.state(), ConnectionState::Absent);
}

#[test]
fn test_drop_closes_undisposed_context() {
    let mock = Mock::new(ConnectionState::Open);
    drop(ConnectionContext::from_connection(mock.connection()));
    assert_eq!(mock.events(), vec![Event::Close]);
}

#[test]
fn test_drop_after_dispose_does_not_close_again() {
    let mock = Mock::new(ConnectionState::Open);
    let mut context = ConnectionContext::from_connection(mock.connection());
    context.dispose();
    drop(context);
    assert_eq!(mock.count(&Event::Close), 1);
}

#[test]
fn test_validate_after_dispose_fails() {
    let mock = Mock::new(ConnectionState::Open);
    let mut context = ConnectionContext::from_connection(mock.connection());
    context.dispose();

    let err = context.validate_connection_state().unwrap_err();

    assert!(matches!(err, SprocketError::ConnectionState(_)));
    assert_eq!(mock.count(&Event::Open), 0);
}
