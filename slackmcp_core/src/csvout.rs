//! Serde-to-CSV helper shared by every handler. All tool output is CSV:
//! compact for an LLM to read, with an opaque `cursor` column on the last
//! row when more pages exist.

use serde::Serialize;

use crate::error::ServerError;

pub fn to_csv<T: Serialize>(rows: &[T]) -> Result<String, ServerError> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    for row in rows {
        writer
            .serialize(row)
            .map_err(|e| ServerError::Internal(format!("CSV encoding failed: {}", e)))?;
    }
    let bytes = writer
        .into_inner()
        .map_err(|e| ServerError::Internal(format!("CSV encoding failed: {}", e)))?;
    String::from_utf8(bytes).map_err(|e| ServerError::Internal(format!("CSV not UTF-8: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Serialize)]
    struct Row {
        #[serde(rename = "ID")]
        id: String,
        #[serde(rename = "Text")]
        text: String,
    }

    #[test]
    fn quotes_embedded_separators_and_newlines() {
        let rows = vec![Row {
            id: "1".into(),
            text: "hello, \"world\"\nsecond line".into(),
        }];
        let out = to_csv(&rows).unwrap();
        assert!(out.starts_with("ID,Text\n"));
        assert!(out.contains("\"hello, \"\"world\"\"\nsecond line\""));
    }

    #[test]
    fn empty_input_produces_empty_output() {
        let rows: Vec<Row> = vec![];
        assert_eq!(to_csv(&rows).unwrap(), "");
    }
}
