use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Deserializer, Serializer};

/// Blank form text becomes `None`; surrounding whitespace is trimmed.
pub fn deser_empty_to_none<'de, D>(de: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value: Option<String> = Deserialize::deserialize(de)?;
    Ok(value.and_then(|v| {
        let v = v.trim();
        op::ternary!(v.is_empty() => None; Some(v.to_owned()))
    }))
}

/// `YYYY-MM-DD`, blank or absent reads as `None`.
pub fn deser_optional_date<'de, D>(de: D) -> Result<Option<NaiveDate>, D::Error>
where
    D: Deserializer<'de>,
{
    let value: Option<String> = Deserialize::deserialize(de)?;
    match value.as_deref().map(str::trim) {
        None | Some("") => Ok(None),
        Some(v) => NaiveDate::parse_from_str(v, "%Y-%m-%d")
            .map(Some)
            .map_err(serde::de::Error::custom),
    }
}

/// `YYYY-MM-DD HH:MM:SS`, `""` when absent.
pub fn serialize_datetime<S>(value: &Option<NaiveDateTime>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    match value {
        Some(value) => serializer.serialize_str(&value.format("%Y-%m-%d %H:%M:%S").to_string()),
        _ => serializer.serialize_str(""),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Deserialize, serde::Serialize)]
    struct Form {
        #[serde(default, deserialize_with = "deser_empty_to_none")]
        name: Option<String>,
        #[serde(default, deserialize_with = "deser_optional_date")]
        #[serde(skip_serializing)]
        day: Option<NaiveDate>,
        #[serde(default, skip_deserializing, serialize_with = "serialize_datetime")]
        at: Option<NaiveDateTime>,
    }

    #[test]
    fn blank_text_and_dates_are_none() {
        let form: Form = serde_json::from_str(r#"{"name": "   ", "day": ""}"#).unwrap();
        assert!(form.name.is_none());
        assert!(form.day.is_none());
    }

    #[test]
    fn text_is_trimmed_and_dates_parse() {
        let form: Form = serde_json::from_str(r#"{"name": " AL0001 ", "day": "2024-03-01"}"#).unwrap();
        assert_eq!(form.name.as_deref(), Some("AL0001"));
        assert_eq!(form.day, NaiveDate::from_ymd_opt(2024, 3, 1));
    }

    #[test]
    fn malformed_date_is_rejected() {
        assert!(serde_json::from_str::<Form>(r#"{"day": "01/03/2024"}"#).is_err());
    }

    #[test]
    fn missing_datetime_serializes_as_empty_string() {
        let form = Form {
            name: None,
            day: None,
            at: None,
        };
        let value = serde_json::to_value(&form).unwrap();
        assert_eq!(value["at"], "");
    }
}
