use image::GrayImage;
use numpy::{PyReadonlyArrayDyn, PyUntypedArrayMethods};
use pyo3::exceptions::{PyRuntimeError, PyTypeError, PyValueError};
use pyo3::prelude::*;
use serde::{Deserialize, Serialize};

use spiderpose::synth::{self, GroundTruth, SceneParams};
use spiderpose::{
    GraphConfig, JointParticleFilter, LabelImage, MarginalRecord, RunParams, SpiderGraph,
};

/// Flat label buffer plus ground truth, as returned by `simulate_json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct SceneDump {
    width: u32,
    height: u32,
    /// Row-major labels, `width * height` values.
    labels: Vec<u8>,
    truth: GroundTruth,
}

fn py_value_error<E: std::fmt::Display>(err: E) -> PyErr {
    PyValueError::new_err(err.to_string())
}

fn labels_from_array(array: PyReadonlyArrayDyn<'_, u8>) -> PyResult<LabelImage> {
    let shape = array.shape();
    let view = array.as_array();

    match shape {
        [h, w] => {
            let mut out = Vec::with_capacity(h.saturating_mul(*w));
            for y in 0..*h {
                for x in 0..*w {
                    out.push(view[[y, x]]);
                }
            }
            GrayImage::from_raw(*w as u32, *h as u32, out)
                .map(LabelImage::from_gray)
                .ok_or_else(|| PyRuntimeError::new_err("failed to build label image"))
        }
        _ => Err(PyTypeError::new_err(
            "expected label array with shape (H, W) and dtype uint8",
        )),
    }
}

#[pyclass(module = "spiderpose._spiderpose")]
struct GraphCore {
    graph: SpiderGraph,
}

#[pymethods]
impl GraphCore {
    #[new]
    #[pyo3(signature = (config_json=None))]
    fn new(config_json: Option<&str>) -> PyResult<Self> {
        let config = match config_json {
            Some(json) => GraphConfig::from_json_str(json).map_err(py_value_error)?,
            None => GraphConfig::default(),
        };
        let graph = SpiderGraph::new(config).map_err(py_value_error)?;
        Ok(Self { graph })
    }

    fn config_json(&self) -> PyResult<String> {
        serde_json::to_string(self.graph.config()).map_err(py_value_error)
    }

    fn phase(&self) -> PyResult<String> {
        serde_json::to_value(self.graph.phase())
            .map(|v| v.as_str().unwrap_or_default().to_string())
            .map_err(py_value_error)
    }

    fn init_random(&mut self, image: PyReadonlyArrayDyn<'_, u8>) -> PyResult<()> {
        let labels = labels_from_array(image)?;
        self.graph.init_random(&labels).map_err(py_value_error)
    }

    fn init_from_observation(&mut self, image: PyReadonlyArrayDyn<'_, u8>) -> PyResult<()> {
        let labels = labels_from_array(image)?;
        self.graph.init_from_observation(&labels).map_err(py_value_error)
    }

    fn update_messages(&mut self, image: PyReadonlyArrayDyn<'_, u8>) -> PyResult<()> {
        let labels = labels_from_array(image)?;
        self.graph.update_messages(&labels).map_err(py_value_error)
    }

    fn update_belief(&mut self) -> PyResult<()> {
        self.graph.update_belief().map_err(py_value_error)
    }

    fn resample(&mut self) -> PyResult<()> {
        self.graph.resample().map_err(py_value_error)
    }

    fn jitter(&mut self) -> PyResult<()> {
        self.graph.jitter().map_err(py_value_error)
    }

    fn step(&mut self, image: PyReadonlyArrayDyn<'_, u8>) -> PyResult<()> {
        let labels = labels_from_array(image)?;
        self.graph.step(&labels).map_err(py_value_error)
    }

    /// Initialize and iterate; returns the inference report as JSON.
    #[pyo3(signature = (image, params_json=None))]
    fn run_json(&mut self, image: PyReadonlyArrayDyn<'_, u8>, params_json: Option<&str>) -> PyResult<String> {
        let labels = labels_from_array(image)?;
        let params: RunParams = match params_json {
            Some(json) => serde_json::from_str(json).map_err(py_value_error)?,
            None => RunParams::default(),
        };
        let report = spiderpose::run_inference(&mut self.graph, &labels, &params).map_err(py_value_error)?;
        serde_json::to_string(&report).map_err(py_value_error)
    }

    fn marginals_json(&self) -> PyResult<String> {
        let records: Vec<MarginalRecord> = self
            .graph
            .marginals()
            .map_err(py_value_error)?
            .iter()
            .map(|m| m.to_record())
            .collect();
        serde_json::to_string(&records).map_err(py_value_error)
    }

    fn estimate_json(&self) -> PyResult<String> {
        let estimate = self.graph.estimate().map_err(py_value_error)?;
        serde_json::to_string(&estimate).map_err(py_value_error)
    }
}

#[pyfunction]
fn package_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[pyfunction]
fn default_config_json() -> PyResult<String> {
    serde_json::to_string(&GraphConfig::default()).map_err(py_value_error)
}

#[pyfunction]
#[pyo3(signature = (params_json=None))]
fn simulate_json(params_json: Option<&str>) -> PyResult<String> {
    let params: SceneParams = match params_json {
        Some(json) => serde_json::from_str(json).map_err(py_value_error)?,
        None => SceneParams::default(),
    };
    let scene = synth::generate_scene(&params).map_err(py_value_error)?;
    let [width, height] = scene.image.size();
    let dump = SceneDump {
        width,
        height,
        labels: scene.image.into_gray().into_raw(),
        truth: scene.truth,
    };
    serde_json::to_string(&dump).map_err(py_value_error)
}

/// Run the whole-spider particle filter; returns the inference report as JSON.
#[pyfunction]
#[pyo3(signature = (image, config_json=None, params_json=None))]
fn run_joint_filter_json(
    image: PyReadonlyArrayDyn<'_, u8>,
    config_json: Option<&str>,
    params_json: Option<&str>,
) -> PyResult<String> {
    let labels = labels_from_array(image)?;
    let mut config = match config_json {
        Some(json) => GraphConfig::from_json_str(json).map_err(py_value_error)?,
        None => GraphConfig::default(),
    };
    config.image_size = labels.size();
    let params: RunParams = match params_json {
        Some(json) => serde_json::from_str(json).map_err(py_value_error)?,
        None => RunParams::default(),
    };
    let mut filter = JointParticleFilter::new(config).map_err(py_value_error)?;
    let report =
        spiderpose::run_joint_filter(&mut filter, &labels, &params).map_err(py_value_error)?;
    serde_json::to_string(&report).map_err(py_value_error)
}

#[pyfunction]
fn pose_error_json(estimate_json: &str, truth_json: &str) -> PyResult<String> {
    let estimate = serde_json::from_str(estimate_json).map_err(py_value_error)?;
    let truth: GroundTruth = serde_json::from_str(truth_json).map_err(py_value_error)?;
    let err = synth::pose_error(&estimate, &truth).map_err(py_value_error)?;
    serde_json::to_string(&err).map_err(py_value_error)
}

#[pymodule]
fn _spiderpose(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_class::<GraphCore>()?;

    m.add_function(wrap_pyfunction!(package_version, m)?)?;
    m.add_function(wrap_pyfunction!(default_config_json, m)?)?;
    m.add_function(wrap_pyfunction!(simulate_json, m)?)?;
    m.add_function(wrap_pyfunction!(run_joint_filter_json, m)?)?;
    m.add_function(wrap_pyfunction!(pose_error_json, m)?)?;
    Ok(())
}
