use anyhow::{anyhow, Result};
use std::path::Path;

use super::backend::DetectorBackend;
use super::backends::ScriptedBackend;
use super::labels::LabelTable;

/// Open the detector named by `--model`.
///
/// - `stub://...` opens a scripted backend that reports nothing (dry runs).
/// - `*.onnx` opens the tract backend (feature: backend-tract).
///
/// A missing model file is a configuration error.
pub fn load_detector(model: &str, labels: LabelTable) -> Result<Box<dyn DetectorBackend>> {
    if model.starts_with("stub://") {
        log::info!("detector: {} (scripted, no detections)", model);
        return Ok(Box::new(ScriptedBackend::new(labels)));
    }

    let path = Path::new(model);
    if !path.exists() {
        return Err(anyhow!("model not found: {}", model));
    }
    let ext = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();
    match ext.as_str() {
        "onnx" => open_onnx(path, labels),
        other => Err(anyhow!(
            "unsupported model format '.{}' (export the model to ONNX)",
            other
        )),
    }
}

#[cfg(feature = "backend-tract")]
fn open_onnx(path: &Path, labels: LabelTable) -> Result<Box<dyn DetectorBackend>> {
    let mut backend = super::backends::TractBackend::new(path, labels)?;
    backend.warm_up()?;
    log::info!("detector: {} (tract)", path.display());
    Ok(Box::new(backend))
}

#[cfg(not(feature = "backend-tract"))]
fn open_onnx(path: &Path, _labels: LabelTable) -> Result<Box<dyn DetectorBackend>> {
    Err(anyhow!(
        "loading {} requires the backend-tract feature",
        path.display()
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stub_model_opens_scripted_backend() -> Result<()> {
        let backend = load_detector("stub://sorter", LabelTable::default())?;
        assert_eq!(backend.name(), "stub");
        assert_eq!(backend.labels().len(), 4);
        Ok(())
    }

    #[test]
    fn missing_model_is_reported() {
        let err = match load_detector("/nonexistent/best.onnx", LabelTable::default()) {
            Ok(_) => panic!("missing model accepted"),
            Err(err) => err,
        };
        assert!(err.to_string().contains("model not found"));
    }

    #[test]
    fn unsupported_model_format_is_reported() -> Result<()> {
        let file = tempfile::Builder::new().suffix(".pt").tempfile()?;
        let path = file.path().to_string_lossy().into_owned();
        assert!(load_detector(&path, LabelTable::default()).is_err());
        Ok(())
    }
}
