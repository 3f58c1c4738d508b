//! Tests for the parameter model

use super::*;
use pretty_assertions::assert_eq;
use rstest::rstest;

#[test]
fn test_in_param_carries_value() {
    let param = Parameter::in_param("name", DbType::String, "Alice");
    assert_eq!(param.name(), "name");
    assert_eq!(param.db_type(), DbType::String);
    assert_eq!(param.direction(), ParameterDirection::Input);
    assert_eq!(param.value(), Some(&Value::String("Alice".into())));
}

#[test]
fn test_out_param_starts_unset() {
    let param = Parameter::out_param("total", DbType::Decimal);
    assert_eq!(param.direction(), ParameterDirection::Output);
    assert!(param.value().is_none());
}

#[test]
fn test_in_out_param_carries_value() {
    let param = Parameter::in_out_param("counter", DbType::Int, 7);
    assert_eq!(param.direction(), ParameterDirection::InputOutput);
    assert_eq!(param.value(), Some(&Value::Int32(7)));
}

#[test]
fn test_return_value_param_starts_unset() {
    let param = Parameter::return_value_param("count", DbType::Int);
    assert_eq!(param.direction(), ParameterDirection::ReturnValue);
    assert!(param.value().is_none());
}

#[rstest]
#[case::input(Parameter::in_param("p", DbType::Int, 1), Some(Value::Int32(1)))]
#[case::in_out(Parameter::in_out_param("p", DbType::Int, 2), Some(Value::Int32(2)))]
#[case::output(Parameter::out_param("p", DbType::Int), None)]
#[case::return_value(Parameter::return_value_param("p", DbType::Int), None)]
fn test_driver_conversion_by_direction(#[case] param: Parameter, #[case] expected: Option<Value>) {
    let driver_param = param.to_driver_parameter();
    assert_eq!(driver_param.name, "p");
    assert_eq!(driver_param.direction, param.direction());
    assert_eq!(driver_param.db_type, DbType::Int);
    assert_eq!(driver_param.value, expected);
}

#[test]
fn test_driver_conversion_suppresses_stale_output_value() {
    let mut param = Parameter::out_param("total", DbType::BigInt);
    param.set_output_value(Some(Value::Int64(99)));

    let driver_param = param.to_driver_parameter();
    assert_eq!(driver_param.value, None);
}

#[test]
fn test_driver_parameter_bare_name() {
    let param = Parameter::in_param("@customer_id", DbType::Int, 5).to_driver_parameter();
    assert_eq!(param.bare_name(), "customer_id");

    let param = Parameter::in_param("customer_id", DbType::Int, 5).to_driver_parameter();
    assert_eq!(param.bare_name(), "customer_id");
}

#[test]
fn test_direction_predicates() {
    assert!(ParameterDirection::Input.carries_input());
    assert!(ParameterDirection::InputOutput.carries_input());
    assert!(!ParameterDirection::Output.carries_input());
    assert!(!ParameterDirection::ReturnValue.carries_input());

    assert!(!ParameterDirection::Input.receives_output());
    assert!(ParameterDirection::Output.receives_output());
    assert!(ParameterDirection::InputOutput.receives_output());
    assert!(ParameterDirection::ReturnValue.receives_output());
}

#[test]
fn test_value_from_option() {
    assert_eq!(Value::from(None::<i32>), Value::Null);
    assert_eq!(Value::from(Some(3i64)), Value::Int64(3));
}

#[test]
fn test_into_value_after_output_assignment() {
    let mut param = Parameter::out_param("@note", DbType::String);
    assert_eq!(param.clone().into_value(), None);

    param.set_output_value(Some(Value::String("added".into())));
    let value = param.into_value().unwrap();
    assert_eq!(value.as_str(), Some("added"));
    assert_eq!(Value::Int32(1).as_str(), None);
}
