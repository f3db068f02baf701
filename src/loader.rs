//! Pluggable model loading
//!
//! Concrete file formats are not part of this crate; instead a
//! [`ModelLoader`] implementation is registered per set of file extensions
//! and [`Model::read_from_file`] dispatches on the extension of the path it
//! is given.

use std::collections::HashMap;
use std::path::Path;

use crate::error::{Error, Result};
use crate::model::Model;

/// A loader for one or more model file formats
pub trait ModelLoader {
    /// Lower-case file extensions this loader handles, without dots
    fn extensions(&self) -> &[&str];

    /// Parse the file at `path` and append its contents to `model`
    fn load(&self, path: &Path, model: &mut Model) -> Result<()>;
}

/// Registry dispatching file paths to loaders by extension
#[derive(Default)]
pub struct LoaderRegistry {
    loaders: Vec<Box<dyn ModelLoader>>,
    by_extension: HashMap<String, usize>,
}

impl LoaderRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a loader for all extensions it reports
    ///
    /// A later registration for an already-claimed extension wins.
    pub fn register(&mut self, loader: Box<dyn ModelLoader>) {
        let index = self.loaders.len();
        for ext in loader.extensions() {
            self.by_extension.insert(ext.to_lowercase(), index);
        }
        self.loaders.push(loader);
    }

    /// The loader responsible for `path`, by its extension
    pub fn loader_for(&self, path: &Path) -> Option<&dyn ModelLoader> {
        let ext = path.extension()?.to_str()?.to_lowercase();
        self.by_extension
            .get(&ext)
            .map(|&index| self.loaders[index].as_ref())
    }
}

impl Model {
    /// Load a model from a file through the registry
    ///
    /// Fails with [`Error::UnsupportedFormat`] when no registered loader
    /// claims the file's extension, [`Error::LoadFailure`] when the loader
    /// reports a parse problem and [`Error::EmptyModel`] when the file
    /// parsed but contained no objects. Loaded objects that did not record
    /// a source path get stamped with this one, and with
    /// `add_default_instances` every instance-less object receives a single
    /// default placement.
    pub fn read_from_file(
        path: &Path,
        registry: &LoaderRegistry,
        add_default_instances: bool,
    ) -> Result<Model> {
        std::fs::metadata(path)?;

        let Some(loader) = registry.loader_for(path) else {
            return Err(Error::UnsupportedFormat(path.display().to_string()));
        };

        let mut model = Model::new();
        loader.load(path, &mut model).map_err(|e| match e {
            Error::LoadFailure(_) | Error::Io(_) => e,
            other => Error::LoadFailure(other.to_string()),
        })?;

        if model.objects.is_empty() {
            return Err(Error::EmptyModel);
        }

        let input_file = path.display().to_string();
        for object in &mut model.objects {
            if object.input_file.is_empty() {
                object.input_file = input_file.clone();
            }
        }
        if add_default_instances {
            model.add_default_instances();
        }
        log::debug!(
            "loaded {} object(s) from {}",
            model.objects.len(),
            path.display()
        );
        Ok(model)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::tests::cube;
    use std::io::Write;

    /// Loads any file as a single cube object
    struct CubeLoader;

    impl ModelLoader for CubeLoader {
        fn extensions(&self) -> &[&str] {
            &["cube"]
        }

        fn load(&self, _path: &Path, model: &mut Model) -> Result<()> {
            model.add_object().add_volume(cube(10.0));
            Ok(())
        }
    }

    /// Always fails to parse
    struct BrokenLoader;

    impl ModelLoader for BrokenLoader {
        fn extensions(&self) -> &[&str] {
            &["broken"]
        }

        fn load(&self, _path: &Path, _model: &mut Model) -> Result<()> {
            Err(Error::InvalidMesh("garbled geometry".to_string()))
        }
    }

    /// Parses successfully but produces nothing
    struct EmptyLoader;

    impl ModelLoader for EmptyLoader {
        fn extensions(&self) -> &[&str] {
            &["empty"]
        }

        fn load(&self, _path: &Path, _model: &mut Model) -> Result<()> {
            Ok(())
        }
    }

    fn registry() -> LoaderRegistry {
        let mut registry = LoaderRegistry::new();
        registry.register(Box::new(CubeLoader));
        registry.register(Box::new(BrokenLoader));
        registry.register(Box::new(EmptyLoader));
        registry
    }

    fn temp_file(name: &str) -> (tempfile::TempDir, std::path::PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(name);
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(b"payload").unwrap();
        (dir, path)
    }

    #[test]
    fn test_read_stamps_input_file_and_instances() {
        let (_dir, path) = temp_file("part.cube");
        let model = Model::read_from_file(&path, &registry(), true).unwrap();
        assert_eq!(model.objects.len(), 1);
        assert_eq!(model.objects[0].input_file, path.display().to_string());
        assert_eq!(model.objects[0].instances.len(), 1);
    }

    #[test]
    fn test_read_without_default_instances() {
        let (_dir, path) = temp_file("part.cube");
        let model = Model::read_from_file(&path, &registry(), false).unwrap();
        assert!(model.objects[0].instances.is_empty());
    }

    #[test]
    fn test_unknown_extension() {
        let (_dir, path) = temp_file("part.xyz");
        assert!(matches!(
            Model::read_from_file(&path, &registry(), true),
            Err(Error::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn test_loader_failure_is_wrapped() {
        let (_dir, path) = temp_file("part.broken");
        assert!(matches!(
            Model::read_from_file(&path, &registry(), true),
            Err(Error::LoadFailure(_))
        ));
    }

    #[test]
    fn test_empty_model_rejected() {
        let (_dir, path) = temp_file("part.empty");
        assert!(matches!(
            Model::read_from_file(&path, &registry(), true),
            Err(Error::EmptyModel)
        ));
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let err =
            Model::read_from_file(Path::new("/nonexistent/part.cube"), &registry(), true)
                .unwrap_err();
        assert!(matches!(err, Error::Io(_)));
    }

    #[test]
    fn test_extension_case_insensitive() {
        let (_dir, path) = temp_file("part.CUBE");
        assert!(Model::read_from_file(&path, &registry(), true).is_ok());
    }
}
