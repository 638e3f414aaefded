//! Run environment for forecast runs.
//!
//! A run document has three sections: `input` (model parameters plus the
//! reserved `seed` and `replicate` keys), `model.files` (named input files) and
//! `output` (either a flat filesystem spec or a set of named profiles). Outputs
//! go to the resolved directory, or to stdout when none is configured.

pub mod error;

use std::collections::HashMap;
use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use sha2::{Digest, Sha256};
use tracing::debug;

pub use error::{EnvironmentError, Result};

pub struct Environment<I = ()> {
    input_json: serde_json::Map<String, Value>,
    pub input: Option<I>,
    /// Absent seeds are left to the model, which falls back to a time-derived one.
    pub seed: Option<u64>,
    pub replicate: u64,
    pub files: HashMap<String, PathBuf>,
    output: Value,
}

impl Environment {
    pub fn from_json(data: Value) -> Self {
        let mut input_json = data
            .get("input")
            .and_then(|v| v.as_object())
            .cloned()
            .unwrap_or_default();

        let seed = input_json.remove("seed").and_then(|v| v.as_u64());

        let replicate = input_json
            .remove("replicate")
            .and_then(|v| v.as_u64())
            .unwrap_or(0);

        let files = data
            .get("model")
            .and_then(|m| m.get("files"))
            .and_then(|f| f.as_object())
            .map(|obj| {
                obj.iter()
                    .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), PathBuf::from(s))))
                    .collect()
            })
            .unwrap_or_default();

        let output = data.get("output").cloned().unwrap_or(Value::Null);

        Self {
            input_json,
            input: None,
            seed,
            replicate,
            files,
            output,
        }
    }

    /// Reads a JSON run document.
    pub fn from_reader<R: Read>(mut reader: R) -> Result<Self> {
        let mut raw = String::new();
        reader.read_to_string(&mut raw)?;
        if raw.trim().is_empty() {
            return Err(EnvironmentError::EmptyInput);
        }
        let data: Value = serde_json::from_str(&raw)?;
        Ok(Self::from_json(data))
    }

    pub fn from_stdin() -> Result<Self> {
        Self::from_reader(io::stdin().lock())
    }

    pub fn from_toml_str(raw: &str) -> Result<Self> {
        if raw.trim().is_empty() {
            return Err(EnvironmentError::EmptyInput);
        }
        let data: toml::Value = toml::from_str(raw)?;
        Ok(Self::from_json(serde_json::to_value(data)?))
    }

    /// Reads a run document from disk; `.toml` files are parsed as TOML, anything else as JSON.
    pub fn from_path(path: &Path) -> Result<Self> {
        debug!(path = %path.display(), "reading run document");
        let raw = fs::read_to_string(path)?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("toml") => Self::from_toml_str(&raw),
            _ => Self::from_reader(raw.as_bytes()),
        }
    }

    pub fn with_input_type<I: DeserializeOwned>(self) -> Result<Environment<I>> {
        let input_value = Value::Object(self.input_json.clone());
        let input = serde_json::from_value(input_value)?;
        Ok(Environment {
            input_json: self.input_json,
            input: Some(input),
            seed: self.seed,
            replicate: self.replicate,
            files: self.files,
            output: self.output,
        })
    }
}

impl<I: DeserializeOwned> Environment<I> {
    /// Loads the run document from `path`, or from stdin when no path is given.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let env = match path {
            Some(path) => Environment::from_path(path)?,
            None => Environment::from_stdin()?,
        };
        env.with_input_type::<I>()
    }
}

impl<I> Environment<I> {
    pub fn input_json(&self) -> &serde_json::Map<String, Value> {
        &self.input_json
    }

    /// SHA-256 (hex) of the model input, excluding `seed` and `replicate`.
    pub fn input_digest(&self) -> String {
        // serde_json maps are key-ordered, so the encoding is canonical.
        let encoded = Value::Object(self.input_json.clone()).to_string();
        hex::encode(Sha256::digest(encoded.as_bytes()))
    }

    pub fn output_dir(&self) -> Option<PathBuf> {
        let output = &self.output;

        // Check flat output
        if output.get("spec").and_then(|v| v.as_str()) == Some("filesystem") {
            return output
                .get("dir")
                .and_then(|v| v.as_str())
                .map(PathBuf::from);
        }

        // Check profiled output — resolve default profile
        let profile = output
            .get("profile")
            .and_then(|v| v.as_object())
            .and_then(|profiles| profiles.get("default").or_else(|| profiles.values().next()))?;
        if profile.get("spec").and_then(|v| v.as_str()) == Some("filesystem") {
            return profile.get("dir").and_then(|v| v.as_str()).map(PathBuf::from);
        }

        None
    }

    fn output_file(&self, filename: &str) -> Result<Option<fs::File>> {
        match self.output_dir() {
            Some(dir) => {
                fs::create_dir_all(&dir)?;
                let path = dir.join(filename);
                debug!(path = %path.display(), "writing output");
                Ok(Some(fs::File::create(path)?))
            }
            None => Ok(None),
        }
    }

    pub fn write(&self, filename: &str, data: &[u8]) -> Result<()> {
        match self.output_file(filename)? {
            Some(mut file) => file.write_all(data)?,
            None => io::stdout().write_all(data)?,
        }
        Ok(())
    }

    pub fn write_json<T: Serialize>(&self, filename: &str, value: &T) -> Result<()> {
        let mut data = serde_json::to_vec_pretty(value)?;
        data.push(b'\n');
        self.write(filename, &data)
    }

    pub fn write_csv(&self, filename: &str, headers: &[&str], rows: &[Vec<String>]) -> Result<()> {
        match self.output_file(filename)? {
            Some(file) => write_records(csv::Writer::from_writer(file), headers, rows),
            None => write_records(csv::Writer::from_writer(io::stdout()), headers, rows),
        }
    }
}

fn write_records<W: Write>(
    mut wtr: csv::Writer<W>,
    headers: &[&str],
    rows: &[Vec<String>],
) -> Result<()> {
    wtr.write_record(headers)?;
    for row in rows {
        wtr.write_record(row)?;
    }
    wtr.flush()?;
    Ok(())
}
