use super::metadata::{BindingMetadata, BindingProperty, PropertyFormat};
use crate::binding::ServiceBinding;
use crate::error::LoadError;
use crate::prelude::debug;
use crate::watcher_cache::DirectoryLoader;
use serde_json::{Map, Value};
use std::fs;
use std::io;
use std::path::{Component, Path};
use zeroize::Zeroizing;

/// Name of the file describing a binding directory.
pub const METADATA_FILE: &str = ".metadata";

const SERVICE_NAME_KEY: &str = "type";
const TAGS_KEY: &str = "tags";
const PLAN_KEY: &str = "plan";

/// Reads one servicebinding.io directory with a `.metadata` file into a
/// [`ServiceBinding`].
///
/// A directory yields no binding (`Ok(None)`) if it has no readable `.metadata`, if the
/// metadata cannot be parsed, if no string `type` property can be read, or if no
/// credential property can be read. Unreadable property files are skipped.
///
/// One broken directory never hides its siblings: a `.metadata` that exists but cannot
/// be read (permissions, invalid UTF-8, I/O failure) skips the directory as well. Use
/// [`strict`](Self::strict) to get [`LoadError::Io`] for those instead.
///
/// # Examples
///
/// ```no_run
/// use service_binding::io::ServiceBindingIoLoader;
/// use service_binding::watcher_cache::DirectoryLoader;
/// use std::path::Path;
///
/// let binding = ServiceBindingIoLoader::new().load(Path::new("/bindings/my-xsuaa"))?;
/// # Ok::<(), service_binding::LoadError>(())
/// ```
#[derive(Clone, Copy, Debug, Default)]
pub struct ServiceBindingIoLoader {
    strict: bool,
}

impl ServiceBindingIoLoader {
    /// Creates a loader that skips directories with an unreadable `.metadata`.
    pub const fn new() -> Self {
        Self { strict: false }
    }

    /// Creates a loader that reports an unreadable `.metadata` as [`LoadError::Io`].
    pub const fn strict() -> Self {
        Self { strict: true }
    }
}

impl DirectoryLoader for ServiceBindingIoLoader {
    type Record = ServiceBinding;
    type Error = LoadError;

    fn load(&self, directory: &Path) -> Result<Option<ServiceBinding>, LoadError> {
        let metadata_path = directory.join(METADATA_FILE);
        let raw_metadata = match read_metadata_file(&metadata_path) {
            Ok(Some(raw)) => raw,
            Ok(None) => {
                debug!(
                    "Skipping {}: no {} file",
                    directory.display(),
                    METADATA_FILE
                );
                return Ok(None);
            }
            Err(e) if self.strict => return Err(e),
            Err(e) => {
                debug!("Skipping {}: {}", directory.display(), e);
                return Ok(None);
            }
        };

        let metadata = match BindingMetadata::from_json(&raw_metadata) {
            Ok(metadata) => metadata,
            Err(e) => {
                debug!(
                    "Skipping {}: cannot parse {}: {}",
                    directory.display(),
                    METADATA_FILE,
                    e
                );
                return Ok(None);
            }
        };

        let mut properties = Map::new();
        for property in metadata.metadata_properties() {
            add_property(&mut properties, directory, property);
        }

        let Some(service_name) = properties
            .get(SERVICE_NAME_KEY)
            .and_then(Value::as_str)
            .map(str::to_owned)
        else {
            debug!(
                "Skipping {}: no '{}' property",
                directory.display(),
                SERVICE_NAME_KEY
            );
            return Ok(None);
        };

        let mut credentials = Map::new();
        for property in metadata.credential_properties() {
            add_property(&mut credentials, directory, property);
        }
        if credentials.is_empty() {
            debug!("Skipping {}: no credentials", directory.display());
            return Ok(None);
        }

        let mut builder = ServiceBinding::builder()
            .service_name(service_name)
            .credentials(credentials);
        if let Some(name) = directory.file_name() {
            builder = builder.name(name.to_string_lossy());
        }
        if let Some(plan) = properties.get(PLAN_KEY).and_then(Value::as_str) {
            builder = builder.service_plan(plan);
        }
        if let Some(tags) = properties.get(TAGS_KEY).and_then(Value::as_array) {
            builder = builder.tags(tags.iter().filter_map(Value::as_str));
        }
        for (key, value) in properties {
            builder = builder.property(key, value);
        }

        debug!("Read service binding from {}", directory.display());
        Ok(Some(builder.build()))
    }
}

// A missing metadata file is `None`; every other failure is reported to the caller.
fn read_metadata_file(path: &Path) -> Result<Option<Zeroizing<String>>, LoadError> {
    let io_error = |source: io::Error| LoadError::Io {
        path: path.to_path_buf(),
        source,
    };

    match fs::metadata(path) {
        Ok(meta) if meta.is_file() => {}
        Ok(_) => return Ok(None),
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(io_error(e)),
    }

    match read_lines(path) {
        Ok(content) => Ok(Some(content)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(io_error(e)),
    }
}

fn add_property(target: &mut Map<String, Value>, directory: &Path, property: &BindingProperty) {
    let source = Path::new(property.source_name());
    if !source.components().all(|c| matches!(c, Component::Normal(_))) {
        debug!(
            "Ignoring property '{}': source '{}' leaves the binding directory",
            property.name(),
            property.source_name()
        );
        return;
    }

    let path = directory.join(source);
    if !path.is_file() {
        return;
    }
    let content = match read_lines(&path) {
        Ok(content) => content,
        Err(e) => {
            debug!("Ignoring property '{}': {}", property.name(), e);
            return;
        }
    };

    match property.format() {
        PropertyFormat::Text => {
            target.insert(property.name().to_owned(), Value::String(content.as_str().to_owned()));
        }
        PropertyFormat::Json => {
            let Ok(value) = serde_json::from_str::<Value>(&content) else {
                debug!("Ignoring property '{}': invalid json", property.name());
                return;
            };
            match value {
                Value::Object(entries) if property.is_container() => target.extend(entries),
                _ if property.is_container() => {
                    debug!("Ignoring container property '{}': not an object", property.name());
                }
                value => {
                    target.insert(property.name().to_owned(), value);
                }
            }
        }
    }
}

/// Reads a UTF-8 file and joins its lines with `\n`, dropping the final terminator.
fn read_lines(path: &Path) -> io::Result<Zeroizing<String>> {
    let raw = Zeroizing::new(fs::read_to_string(path)?);
    let mut joined = Zeroizing::new(String::with_capacity(raw.len()));
    for (i, line) in raw.lines().enumerate() {
        if i > 0 {
            joined.push('\n');
        }
        joined.push_str(line);
    }
    Ok(joined)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    const METADATA: &str = r#"{
        "metaDataProperties": [
            {"name": "type", "format": "text"},
            {"name": "plan", "format": "text"},
            {"name": "tags", "format": "json"},
            {"name": "instance_name", "format": "text"}
        ],
        "credentialProperties": [
            {"name": "clientid", "format": "text"},
            {"name": "uaa", "sourceName": "uaa.json", "format": "json", "container": true},
            {"name": "port", "format": "json"}
        ]
    }"#;

    fn binding_dir(files: &[(&str, &str)]) -> (TempDir, std::path::PathBuf) {
        let root = tempfile::tempdir().unwrap();
        let dir = root.path().join("my-xsuaa");
        fs::create_dir(&dir).unwrap();
        for (name, content) in files {
            fs::write(dir.join(name), content).unwrap();
        }
        (root, dir)
    }

    #[test]
    fn reads_a_complete_binding() {
        let (_root, dir) = binding_dir(&[
            (METADATA_FILE, METADATA),
            ("type", "xsuaa\n"),
            ("plan", "application"),
            ("tags", r#"["xsuaa", "auth"]"#),
            ("instance_name", "line one\r\nline two\n"),
            ("clientid", "sb-app"),
            ("uaa.json", r#"{"url": "https://uaa.example.com", "verificationkey": "k"}"#),
            ("port", "8443"),
        ]);

        let binding = ServiceBindingIoLoader::new().load(&dir).unwrap().unwrap();

        assert_eq!(binding.name(), Some("my-xsuaa"));
        assert_eq!(binding.service_name(), Some("xsuaa"));
        assert_eq!(binding.service_plan(), Some("application"));
        assert_eq!(binding.tags(), ["xsuaa", "auth"]);
        assert_eq!(binding.get("instance_name"), Some(&json!("line one\nline two")));
        assert!(binding.contains_key("tags"));

        let credentials = binding.credentials();
        assert_eq!(credentials["clientid"], "sb-app");
        assert_eq!(credentials["url"], "https://uaa.example.com");
        assert_eq!(credentials["port"], 8443);
        assert!(!credentials.contains_key("uaa"));
    }

    #[test]
    fn directory_without_metadata_has_no_binding() {
        let (_root, dir) = binding_dir(&[("type", "xsuaa")]);
        assert!(ServiceBindingIoLoader::new().load(&dir).unwrap().is_none());
    }

    #[test]
    fn unparsable_metadata_has_no_binding() {
        let (_root, dir) = binding_dir(&[(METADATA_FILE, "not json"), ("type", "xsuaa")]);
        assert!(ServiceBindingIoLoader::new().load(&dir).unwrap().is_none());
    }

    #[test]
    fn missing_type_has_no_binding() {
        let (_root, dir) = binding_dir(&[(METADATA_FILE, METADATA), ("clientid", "sb-app")]);
        assert!(ServiceBindingIoLoader::new().load(&dir).unwrap().is_none());
    }

    #[test]
    fn json_type_is_not_a_service_name() {
        let metadata = r#"{
            "metaDataProperties": [{"name": "type", "format": "json"}],
            "credentialProperties": [{"name": "clientid", "format": "text"}]
        }"#;
        let (_root, dir) = binding_dir(&[
            (METADATA_FILE, metadata),
            ("type", "42"),
            ("clientid", "sb-app"),
        ]);
        assert!(ServiceBindingIoLoader::new().load(&dir).unwrap().is_none());
    }

    #[test]
    fn missing_credentials_have_no_binding() {
        let (_root, dir) = binding_dir(&[
            (METADATA_FILE, METADATA),
            ("type", "xsuaa"),
            ("uaa.json", "[1, 2]"),
            ("port", "not json"),
        ]);
        assert!(ServiceBindingIoLoader::new().load(&dir).unwrap().is_none());
    }

    #[test]
    fn source_names_outside_the_directory_are_ignored() {
        let metadata = r#"{
            "metaDataProperties": [{"name": "type", "format": "text"}],
            "credentialProperties": [
                {"name": "secret", "sourceName": "../secret", "format": "text"},
                {"name": "clientid", "format": "text"}
            ]
        }"#;
        let (root, dir) = binding_dir(&[
            (METADATA_FILE, metadata),
            ("type", "xsuaa"),
            ("clientid", "sb-app"),
        ]);
        fs::write(root.path().join("secret"), "leaked").unwrap();

        let binding = ServiceBindingIoLoader::new().load(&dir).unwrap().unwrap();
        assert!(!binding.credentials().contains_key("secret"));
    }

    #[test]
    fn undecodable_metadata_skips_the_directory() {
        let (_root, dir) = binding_dir(&[("type", "xsuaa"), ("clientid", "sb-app")]);
        fs::write(dir.join(METADATA_FILE), [0xff, 0xfe, 0x00]).unwrap();

        assert!(ServiceBindingIoLoader::new().load(&dir).unwrap().is_none());
    }

    #[test]
    fn strict_loader_reports_undecodable_metadata() {
        let (_root, dir) = binding_dir(&[("type", "xsuaa")]);
        fs::write(dir.join(METADATA_FILE), [0xff, 0xfe, 0x00]).unwrap();

        let err = ServiceBindingIoLoader::strict().load(&dir).unwrap_err();
        let LoadError::Io { path, source } = err;
        assert_eq!(path, dir.join(METADATA_FILE));
        assert_eq!(source.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn strict_loader_still_skips_missing_metadata() {
        let (_root, dir) = binding_dir(&[("type", "xsuaa")]);
        assert!(ServiceBindingIoLoader::strict().load(&dir).unwrap().is_none());
    }

    #[test]
    fn metadata_directory_is_not_a_metadata_file() {
        let (_root, dir) = binding_dir(&[("type", "xsuaa")]);
        fs::create_dir(dir.join(METADATA_FILE)).unwrap();
        assert!(ServiceBindingIoLoader::new().load(&dir).unwrap().is_none());
    }

    #[test]
    fn read_lines_drops_trailing_terminator() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("f");
        fs::write(&path, "a\nb\n\n").unwrap();
        assert_eq!(read_lines(&path).unwrap().as_str(), "a\nb\n");
    }
}
