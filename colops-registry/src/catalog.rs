use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

use colops_types::{FunctionDescriptor, FunctionKind, Param, ParamType};
use serde::Deserialize;

use crate::RegistryError;

/// Function declarations kept in a JSON file.
///
/// The file is re-read on every [`FunctionCatalog::load`]; nothing is cached.
#[derive(Clone, Debug)]
pub struct FunctionCatalog {
    path: PathBuf,
}

#[derive(Debug, Deserialize)]
struct CatalogFile {
    #[serde(rename = "Functions")]
    functions: Vec<FunctionEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct FunctionEntry {
    id: i32,
    name: String,
    #[serde(rename = "Type")]
    kind: i32,
    return_type: i32,
    // BTreeMap keeps parameters sorted by name.
    #[serde(default)]
    params: BTreeMap<String, i32>,
}

impl FunctionCatalog {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> Result<Vec<FunctionDescriptor>, RegistryError> {
        let display = self.path.display().to_string();
        let text = fs::read_to_string(&self.path).map_err(|source| RegistryError::Io {
            path: display.clone(),
            source,
        })?;
        let file: CatalogFile = serde_json::from_str(&text).map_err(|source| RegistryError::Parse {
            path: display,
            source,
        })?;

        let mut seen = HashSet::new();
        let mut out = Vec::with_capacity(file.functions.len());
        for entry in file.functions {
            if !seen.insert(entry.id) {
                return Err(RegistryError::DuplicateId(entry.id));
            }
            out.push(entry.into_descriptor()?);
        }
        Ok(out)
    }
}

impl FunctionEntry {
    fn into_descriptor(self) -> Result<FunctionDescriptor, RegistryError> {
        let id = self.id;
        let kind = FunctionKind::from_code(self.kind)
            .ok_or(RegistryError::UnknownKind { id, code: self.kind })?;
        let return_type = ParamType::from_code(self.return_type).ok_or_else(|| {
            RegistryError::UnknownType {
                id,
                field: "return value".into(),
                code: self.return_type,
            }
        })?;
        let params = self
            .params
            .into_iter()
            .map(|(name, code)| match ParamType::from_code(code) {
                Some(ty) => Ok(Param { name, ty }),
                None => Err(RegistryError::UnknownType {
                    id,
                    field: name,
                    code,
                }),
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(FunctionDescriptor {
            id,
            name: self.name,
            kind,
            params,
            return_type,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write(json: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(json.as_bytes()).unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn params_are_sorted_by_name() {
        let file = write(
            r#"{"Functions": [{"Id": 6, "Name": "ConvertUSDtoGBP", "Type": 2, "ReturnType": 1,
                "Params": {"userid": 0, "amount": 1}}]}"#,
        );
        let functions = FunctionCatalog::new(file.path()).load().unwrap();
        let f = &functions[0];
        assert_eq!(f.kind, FunctionKind::Tensor);
        let names: Vec<_> = f.params.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, ["amount", "userid"]);
        assert_eq!(f.params[1].ty, ParamType::String);
    }

    #[test]
    fn changes_on_disk_are_picked_up() {
        let file = write(r#"{"Functions": []}"#);
        let catalog = FunctionCatalog::new(file.path());
        assert!(catalog.load().unwrap().is_empty());

        fs::write(
            file.path(),
            r#"{"Functions": [{"Id": 1, "Name": "SumOfColumn", "Type": 1, "ReturnType": 1, "Params": {"col1": 1}}]}"#,
        )
        .unwrap();
        assert_eq!(catalog.load().unwrap().len(), 1);
    }

    #[test]
    fn duplicate_ids_rejected() {
        let file = write(
            r#"{"Functions": [
                {"Id": 1, "Name": "A", "Type": 0, "ReturnType": 1, "Params": {}},
                {"Id": 1, "Name": "B", "Type": 0, "ReturnType": 1, "Params": {}}]}"#,
        );
        assert!(matches!(
            FunctionCatalog::new(file.path()).load(),
            Err(RegistryError::DuplicateId(1))
        ));
    }

    #[test]
    fn unknown_codes_rejected() {
        let file = write(r#"{"Functions": [{"Id": 3, "Name": "A", "Type": 7, "ReturnType": 1}]}"#);
        assert!(matches!(
            FunctionCatalog::new(file.path()).load(),
            Err(RegistryError::UnknownKind { id: 3, code: 7 })
        ));

        let file = write(
            r#"{"Functions": [{"Id": 3, "Name": "A", "Type": 0, "ReturnType": 1, "Params": {"x": 9}}]}"#,
        );
        assert!(matches!(
            FunctionCatalog::new(file.path()).load(),
            Err(RegistryError::UnknownType { id: 3, code: 9, .. })
        ));
    }

    #[test]
    fn missing_file_is_io_error() {
        let catalog = FunctionCatalog::new("/nonexistent/functions.json");
        assert!(matches!(catalog.load(), Err(RegistryError::Io { .. })));
    }
}
