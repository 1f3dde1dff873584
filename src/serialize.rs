//! Utilities for input/output.
//!
//! Provides JSON line output, parsing of code parameters and codec variants,
//! and the JSON form of degree distributions.
use std::{
    collections::{BTreeMap, HashMap},
    fmt,
    io::{self, Write},
    str::FromStr,
};

use serde::{Deserialize, Serialize};

use crate::{
    code::{BlockDegrees, CodeDegrees, CodeParams, CodecVariant},
    errors::{Error, Result},
};

/// Writes values to a writer in JSON format, one value per line.
///
/// # Arguments
///
/// * `iter` - An iterator yielding the values to be serialized
/// * `writer` - A mutable reference to a writer where the JSON data will be
///   written
///
/// # Returns
///
/// Returns `Ok(())` on success, or an `io::Error` if writing fails or
/// serialization fails.
pub fn write_json_lines<I, T, W>(iter: I, writer: &mut W) -> io::Result<()>
where
    I: Iterator<Item = T>,
    T: Serialize,
    W: Write,
{
    for value in iter {
        let json = serde_json::to_string(&value).map_err(io::Error::other)?;
        writer.write_all(json.as_bytes())?;
        writer.write_all(b"\n")?;
    }
    writer.flush()?;

    Ok(())
}

impl FromStr for CodecVariant {
    type Err = Error;

    /// Parses a codec variant: `ldgm`, `staircase` or `triangle`, in any
    /// case.
    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "ldgm" => Ok(CodecVariant::Ldgm),
            "staircase" | "stairs" => Ok(CodecVariant::Staircase),
            "triangle" => Ok(CodecVariant::Triangle),
            _ => Err(Error::parse(format!("Unknown codec variant '{}'", s))),
        }
    }
}

impl fmt::Display for CodecVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CodecVariant::Ldgm => "ldgm",
            CodecVariant::Staircase => "staircase",
            CodecVariant::Triangle => "triangle",
        };
        f.write_str(name)
    }
}

impl FromStr for CodeParams {
    type Err = Error;

    /// Parses code parameters from a JSON object.
    ///
    /// # Arguments
    ///
    /// * `s` - A JSON object with the fields of `CodeParams`
    ///
    /// # Returns
    ///
    /// Validated `CodeParams` or an `Error` if parsing or validation fails.
    fn from_str(s: &str) -> Result<Self> {
        let params: CodeParams = serde_json::from_str(s)
            .map_err(|e| Error::parse(format!("Failed to parse code parameters JSON: {}", e)))?;
        params.validate()?;
        Ok(params)
    }
}

impl FromStr for CodeDegrees {
    type Err = Error;

    /// Parses code degrees from a JSON string representation.
    ///
    /// # Arguments
    ///
    /// * `s` - A string containing JSON data representing code degrees
    ///
    /// # Returns
    ///
    /// `CodeDegrees` or an `Error` if parsing fails.
    fn from_str(s: &str) -> Result<Self> {
        serde_json::from_str(s)
            .map_err(|e| Error::parse(format!("Failed to parse code degrees JSON: {}", e)))
    }
}

/// `{ Δ: n_Δ }` as a list of `{"degree": Δ, "count": n_Δ}`, by degree.
fn degree_list(block: &BlockDegrees) -> Vec<BTreeMap<&'static str, usize>> {
    block
        .iter()
        .collect::<BTreeMap<_, _>>()
        .into_iter()
        .map(|(&degree, &count)| BTreeMap::from([("degree", degree), ("count", count)]))
        .collect()
}

impl Serialize for CodeDegrees {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let entries = BTreeMap::from([
            ("checks", degree_list(&self.checks)),
            ("data", degree_list(&self.data)),
            ("parity", degree_list(&self.parity)),
        ]);

        entries.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for CodeDegrees {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let value = serde_json::Value::deserialize(deserializer)?;
        let block = |name: &str| -> std::result::Result<BlockDegrees, D::Error> {
            parse_degree_distribution(&value[name])
                .map_err(|e| serde::de::Error::custom(format!("{}: {}", name, e)))
        };
        Ok(CodeDegrees {
            checks: block("checks")?,
            data: block("data")?,
            parity: block("parity")?,
        })
    }
}

/// Parses a JSON value into a degree distribution.
///
/// # Arguments
///
/// * `value` - A serde_json::Value containing an array of objects with
///   "degree" and "count" fields.
///
/// # Returns
///
/// A HashMap where keys are degrees and values are counts, or an Error if
/// parsing fails.
///
/// # Errors
///
/// Returns an error if the JSON is invalid or missing required fields.
fn parse_degree_distribution(value: &serde_json::Value) -> Result<BlockDegrees> {
    let mut map = HashMap::new();
    for item in value
        .as_array()
        .ok_or_else(|| Error::parse("Degree distribution must be an array of degree-count objects"))?
    {
        let degree = item["degree"].as_u64().ok_or_else(|| {
            Error::parse("Missing or invalid 'degree' field in degree distribution")
        })? as usize;
        let count = item["count"].as_u64().ok_or_else(|| {
            Error::parse("Missing or invalid 'count' field in degree distribution")
        })? as usize;
        map.insert(degree, count);
    }
    Ok(map)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn variants_parse_and_print() {
        for variant in [CodecVariant::Ldgm, CodecVariant::Staircase, CodecVariant::Triangle] {
            assert_eq!(variant.to_string().parse::<CodecVariant>().unwrap(), variant);
        }
        assert_eq!("Staircase".parse::<CodecVariant>().unwrap(), CodecVariant::Staircase);
        assert!(matches!("ldpc".parse::<CodecVariant>(), Err(Error::Parse(_))));
    }

    #[test]
    fn params_from_json_are_validated() {
        let params: CodeParams = r#"{"data_blocks": 8, "parity_blocks": 16, "left_degree": 3,
            "seed": 21, "variant": "triangle"}"#
            .parse()
            .unwrap();
        assert_eq!(params, CodeParams::new(8, 16, 3, 21, CodecVariant::Triangle).unwrap());

        let too_dense = r#"{"data_blocks": 8, "parity_blocks": 2, "left_degree": 3,
            "seed": 21, "variant": "ldgm"}"#;
        assert!(matches!(too_dense.parse::<CodeParams>(), Err(Error::Config(_))));
        assert!(matches!("{".parse::<CodeParams>(), Err(Error::Parse(_))));
    }

    #[test]
    fn degrees_json_format() {
        let degrees = CodeDegrees {
            checks: HashMap::from([(9, 2), (8, 1)]),
            data: HashMap::from([(3, 4)]),
            parity: HashMap::from([(2, 2), (1, 1)]),
        };
        let json = serde_json::to_string(&degrees).unwrap();
        assert_eq!(
            json,
            concat!(
                r#"{"checks":[{"count":1,"degree":8},{"count":2,"degree":9}],"#,
                r#""data":[{"count":4,"degree":3}],"#,
                r#""parity":[{"count":1,"degree":1},{"count":2,"degree":2}]}"#
            )
        );
        assert_eq!(json.parse::<CodeDegrees>().unwrap(), degrees);
    }

    #[test]
    fn degrees_missing_field() {
        let err = r#"{"checks": [{"degree": 2}], "data": [], "parity": []}"#
            .parse::<CodeDegrees>()
            .unwrap_err();
        assert!(matches!(err, Error::Parse(_)));
    }

    #[test]
    fn json_lines() {
        let mut out = Vec::new();
        write_json_lines([(1, "a"), (2, "b")].into_iter(), &mut out).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "[1,\"a\"]\n[2,\"b\"]\n");
    }
}
