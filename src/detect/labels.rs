use anyhow::{anyhow, Context, Result};
use std::borrow::Cow;
use std::path::Path;

/// Class names the bundled sorter model was trained on, in class-id order.
pub const DEFAULT_CLASS_NAMES: &[&str] = &["bottle-can", "bottle-glass", "bottle-plastic", "cap"];

/// Maps class ids to display names. Fixed for the lifetime of a loaded model.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LabelTable {
    names: Vec<String>,
}

impl LabelTable {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            names: names.into_iter().map(Into::into).collect(),
        }
    }

    /// Read a labels file: one class name per line, blank lines and `#` comments ignored.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read labels file {}", path.display()))?;
        let table = Self::new(
            raw.lines()
                .map(str::trim)
                .filter(|line| !line.is_empty() && !line.starts_with('#')),
        );
        if table.is_empty() {
            return Err(anyhow!("labels file {} lists no classes", path.display()));
        }
        Ok(table)
    }

    /// Display name for a class id. Ids outside the table get a synthetic `class_<id>` name.
    pub fn name(&self, class_id: usize) -> Cow<'_, str> {
        match self.names.get(class_id) {
            Some(name) => Cow::Borrowed(name.as_str()),
            None => Cow::Owned(format!("class_{}", class_id)),
        }
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }
}

impl Default for LabelTable {
    fn default() -> Self {
        Self::new(DEFAULT_CLASS_NAMES.iter().copied())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn unknown_class_ids_get_synthetic_names() {
        let table = LabelTable::default();
        assert_eq!(table.name(2), "bottle-plastic");
        assert_eq!(table.name(9), "class_9");
    }

    #[test]
    fn loads_labels_file() -> Result<()> {
        let mut file = tempfile::NamedTempFile::new()?;
        writeln!(file, "# sorter classes")?;
        writeln!(file, "can")?;
        writeln!(file)?;
        writeln!(file, "  glass  ")?;
        let table = LabelTable::load(file.path())?;
        assert_eq!(table.names(), &["can".to_string(), "glass".to_string()]);
        Ok(())
    }

    #[test]
    fn empty_labels_file_is_rejected() -> Result<()> {
        let file = tempfile::NamedTempFile::new()?;
        assert!(LabelTable::load(file.path()).is_err());
        Ok(())
    }
}
