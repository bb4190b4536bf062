use serde::de::DeserializeOwned;

use crate::error::{InferError, Result};

/// Deserialize with the JSON path of the offending value in the error.
pub fn from_str_with_path<T: DeserializeOwned>(src: &str) -> Result<T> {
    let de = &mut serde_json::Deserializer::from_str(src);
    serde_path_to_error::deserialize::<_, T>(de).map_err(|err| {
        let path = err.path().to_string();
        InferError::Config { message: format!("at JSON path {path} → {}", err.into_inner()) }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn errors_name_the_offending_path() {
        let err = from_str_with_path::<BTreeMap<String, Vec<u32>>>(r#"{"a": [1, "x"]}"#).unwrap_err();
        let InferError::Config { message } = err else { panic!("expected config error") };
        assert!(message.contains("a[1]"), "{message}");
    }
}
