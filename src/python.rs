use crate::core::analyzer::{classify, DamageAnalyzer};
use crate::io::catalog::{CatalogConfig, SceneCatalog};
use crate::service::{DamageService, MemoryReportCache, RiskZoneTable};
use crate::types::DamageError;
use pyo3::exceptions::{PyRuntimeError, PyValueError};
use pyo3::prelude::*;
use pyo3::types::PyDict;
use std::time::Duration;

/// Request problems become ValueError, everything else RuntimeError
fn to_py_err(err: DamageError) -> PyErr {
    if err.is_recoverable() {
        PyValueError::new_err(err.to_string())
    } else {
        PyRuntimeError::new_err(err.to_string())
    }
}

/// Python wrapper for the cached damage service over a scene catalog
#[pyclass(name = "DamageAnalyzer")]
struct PyDamageAnalyzer {
    inner: DamageService<SceneCatalog, MemoryReportCache, RiskZoneTable>,
}

#[pymethods]
impl PyDamageAnalyzer {
    #[new]
    #[pyo3(signature = (catalog_dir, preview_dir=None, cache_ttl_secs=3600))]
    fn new(
        catalog_dir: String,
        preview_dir: Option<String>,
        cache_ttl_secs: u64,
    ) -> PyResult<Self> {
        let mut config = CatalogConfig::new(&catalog_dir);
        if let Some(dir) = preview_dir {
            config.preview_dir = dir.into();
        }
        let catalog = SceneCatalog::open(config).map_err(to_py_err)?;

        Ok(PyDamageAnalyzer {
            inner: DamageService::new(
                DamageAnalyzer::new(catalog),
                MemoryReportCache::new(Duration::from_secs(cache_ttl_secs)),
                RiskZoneTable::default(),
            ),
        })
    }

    fn analyze(
        &self,
        py: Python,
        lat: f64,
        lon: f64,
        event_date: &str,
        disaster_type: &str,
    ) -> PyResult<PyObject> {
        let enriched = py
            .allow_threads(|| self.inner.analyze(lat, lon, event_date, disaster_type))
            .map_err(to_py_err)?;
        let report = &enriched.report;

        let result = PyDict::new(py);
        result.set_item("status", report.severity.label())?;
        result.set_item("damage_percent", report.damage_percent)?;
        result.set_item("image_url_before", &report.visualization.before)?;
        result.set_item("image_url_after", &report.visualization.after)?;
        result.set_item("image_url_damage_map", &report.visualization.change)?;
        result.set_item("location_processed", report.location.to_string())?;
        result.set_item("date_processed", report.event_date.to_string())?;
        result.set_item("type_processed", report.disaster_type.as_str())?;
        result.set_item("before_scene", &report.before_scene)?;
        result.set_item("after_scene", &report.after_scene)?;
        result.set_item("risk_context", &enriched.risk_context)?;
        result.set_item("cached", enriched.cached)?;
        Ok(result.to_object(py))
    }
}

/// Severity label for a damage percentage
#[pyfunction]
fn classify_damage(damage_percent: f64) -> &'static str {
    classify(damage_percent).label()
}

/// Python module definition
#[pymodule]
fn _core(_py: Python, m: &PyModule) -> PyResult<()> {
    m.add_class::<PyDamageAnalyzer>()?;
    m.add_function(wrap_pyfunction!(classify_damage, m)?)?;
    Ok(())
}
