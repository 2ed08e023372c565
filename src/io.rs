//! Utilities for input/output.

use anyhow::{Context, Result};
use serde::{Serialize, de::DeserializeOwned};
use std::{
    fs::{self, File},
    io::{self, BufReader, Read, Write},
    path::Path,
};

/// Creates any directories missing in order for the given path to be valid.
pub fn create_directory_if_missing(path: impl AsRef<Path>) -> io::Result<()> {
    let path = path.as_ref();
    if path.extension().is_some() {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
        } else {
            Ok(())
        }
    } else {
        fs::create_dir_all(path)
    }
}

/// Creates the file at the given path, as well as any missing parent
/// directories.
pub fn create_file_and_required_directories(file_path: impl AsRef<Path>) -> io::Result<File> {
    create_directory_if_missing(&file_path)?;
    File::create(file_path)
}

/// Reads and returns the content of the specified text file.
pub fn read_text_file(file_path: impl AsRef<Path>) -> io::Result<String> {
    let file = File::open(file_path)?;
    let mut text = String::new();
    let _ = BufReader::new(file).read_to_string(&mut text)?;
    Ok(text)
}

/// Writes the given string as a text file with the specified path, regardless
/// of whether the file already exists.
pub fn write_text_file(text: &str, output_file_path: impl AsRef<Path>) -> io::Result<()> {
    let mut file = create_file_and_required_directories(output_file_path)?;
    write!(&mut file, "{text}")
}

/// Reads the RON (Rusty Object Notation) file at the given path and
/// deserializes the contents into an object of type `T`.
pub fn parse_ron_file<T: DeserializeOwned>(file_path: impl AsRef<Path>) -> Result<T> {
    let file_path = file_path.as_ref();
    let text = read_text_file(file_path)
        .with_context(|| format!("Could not open {}", file_path.display()))?;
    ron::from_str(&text).with_context(|| format!("Invalid syntax in {}", file_path.display()))
}

/// Serializes the given value as pretty RON and writes it to the given
/// path, creating any missing parent directories.
pub fn write_ron_file<T: Serialize>(value: &T, output_file_path: impl AsRef<Path>) -> Result<()> {
    let output_file_path = output_file_path.as_ref();
    let text = ron::ser::to_string_pretty(value, ron::ser::PrettyConfig::default())?;
    write_text_file(&text, output_file_path)
        .with_context(|| format!("Could not write {}", output_file_path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Settings {
        name: String,
        counts: [usize; 3],
    }

    #[test]
    fn written_ron_file_parses_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/settings.ron");
        let settings = Settings {
            name: "sphere".to_string(),
            counts: [4, 3, 1],
        };

        write_ron_file(&settings, &path).unwrap();
        let parsed: Settings = parse_ron_file(&path).unwrap();

        assert_eq!(parsed, settings);
    }

    #[test]
    fn parsing_missing_file_names_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.ron");

        let error = parse_ron_file::<Settings>(&path).unwrap_err();

        assert!(error.to_string().starts_with("Could not open"));
    }

    #[test]
    fn parsing_malformed_file_reports_syntax() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.ron");
        write_text_file("(name: \"sphere\", counts: [4, 3", &path).unwrap();

        let error = parse_ron_file::<Settings>(&path).unwrap_err();

        assert!(error.to_string().starts_with("Invalid syntax in"));
    }
}
