use crate::error::{QueryError, QueryResult};
use crate::schema::{Property, PropertyType};
use crate::value::{RecordData, Value};

/// Normalise record values to their declared property types and enforce
/// `required` properties.
///
/// Keys with no matching property pass through unchanged. Values that cannot
/// be converted are kept as given.
pub fn coerce_record_data(data: RecordData, schema: &[Property]) -> QueryResult<RecordData> {
    let mut out = RecordData::new();
    for (key, value) in data {
        let coerced = match schema.iter().find(|p| p.name == key) {
            Some(prop) => coerce_value(value, prop.kind),
            None => value,
        };
        out.insert(key, coerced);
    }
    for prop in schema.iter().filter(|p| p.required) {
        if out.get(&prop.name).map_or(true, Value::is_empty) {
            return Err(QueryError::Record(format!(
                "missing required property: {}",
                prop.name
            )));
        }
    }
    Ok(out)
}

pub fn coerce_value(value: Value, kind: PropertyType) -> Value {
    match kind {
        PropertyType::Number => match value {
            Value::Text(s) => match s.trim().parse::<f64>() {
                Ok(n) => Value::Number(n),
                Err(_) => Value::Text(s),
            },
            Value::Bool(b) => Value::Number(if b { 1.0 } else { 0.0 }),
            other => other,
        },
        PropertyType::Checkbox => match value {
            Value::Text(s) => match s.trim().to_ascii_lowercase().as_str() {
                "true" | "1" | "yes" => Value::Bool(true),
                "false" | "0" | "no" | "" => Value::Bool(false),
                _ => Value::Text(s),
            },
            Value::Number(n) => Value::Bool(n != 0.0),
            other => other,
        },
        PropertyType::MultiSelect => match value {
            Value::Text(s) => Value::List(
                s.split(',')
                    .map(str::trim)
                    .filter(|part| !part.is_empty())
                    .map(Value::from)
                    .collect(),
            ),
            other => other,
        },
        PropertyType::Text
        | PropertyType::Date
        | PropertyType::Select
        | PropertyType::Url
        | PropertyType::Email
        | PropertyType::Phone => match value {
            Value::Number(_) | Value::Bool(_) => Value::Text(value.to_string()),
            other => other,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schema() -> Vec<Property> {
        vec![
            Property::new("Name", PropertyType::Text).required(),
            Property::new("Age", PropertyType::Number),
            Property::new("Done", PropertyType::Checkbox),
            Property::new("Tags", PropertyType::MultiSelect),
        ]
    }

    fn data(pairs: &[(&str, Value)]) -> RecordData {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn values_follow_declared_types() {
        let out = coerce_record_data(
            data(&[
                ("Name", Value::from(42.0)),
                ("Age", Value::from(" 25 ")),
                ("Done", Value::from("TRUE")),
                ("Tags", Value::from("a, b,,c")),
                ("Extra", Value::from("kept")),
            ]),
            &schema(),
        )
        .unwrap();
        assert_eq!(out["Name"], Value::from("42"));
        assert_eq!(out["Age"], Value::from(25.0));
        assert_eq!(out["Done"], Value::from(true));
        assert_eq!(out["Tags"], Value::from(vec!["a", "b", "c"]));
        assert_eq!(out["Extra"], Value::from("kept"));
    }

    #[test]
    fn unconvertible_values_are_kept() {
        assert_eq!(
            coerce_value(Value::from("n/a"), PropertyType::Number),
            Value::from("n/a")
        );
        assert_eq!(
            coerce_value(Value::from("maybe"), PropertyType::Checkbox),
            Value::from("maybe")
        );
    }

    #[test]
    fn required_properties_must_be_present() {
        let err = coerce_record_data(data(&[("Age", Value::from(1.0))]), &schema()).unwrap_err();
        assert_eq!(err.detail(), "missing required property: Name");
        let err = coerce_record_data(data(&[("Name", Value::from(""))]), &schema()).unwrap_err();
        assert_eq!(err.kind(), strata_types::ErrorKind::Validation);
    }
}
