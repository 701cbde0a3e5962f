#![cfg(feature = "python")]

use pyo3::exceptions::PyValueError;
use pyo3::prelude::*;
use pyo3::types::PyDict;

use crate::{
    out_of_range_tags, round_to, tag_similarity, TagVector, MAX_ROUND_DIGITS,
    SIMILARITY_METRIC_ID,
};

fn extract_tags(obj: &Bound<'_, PyAny>) -> PyResult<TagVector> {
    let dict = obj
        .downcast::<PyDict>()
        .map_err(|_| PyValueError::new_err("tag vector must be a dict of str -> number"))?;
    let mut tags = TagVector::new();
    for (key, value) in dict.iter() {
        let key: String = key.extract()?;
        let value: f64 = value.extract().map_err(|_| {
            PyValueError::new_err(format!("tag {:?} must map to a number", key))
        })?;
        tags.insert(key, value);
    }
    Ok(tags)
}

/// Python API wrapper for tag_similarity
#[pyfunction]
#[pyo3(name = "tag_similarity")]
fn tag_similarity_py(
    left: &Bound<'_, PyAny>,
    right: &Bound<'_, PyAny>,
    digits: Option<u32>,
) -> PyResult<f64> {
    if let Some(digits) = digits.filter(|digits| *digits > MAX_ROUND_DIGITS) {
        return Err(PyValueError::new_err(format!(
            "digits must be at most {MAX_ROUND_DIGITS}, got {digits}"
        )));
    }
    let left = extract_tags(left)?;
    let right = extract_tags(right)?;
    let similarity = tag_similarity(&left, &right);
    Ok(match digits {
        Some(digits) => round_to(similarity, digits),
        None => similarity,
    })
}

#[pyfunction]
#[pyo3(name = "out_of_range_tags")]
fn out_of_range_tags_py(tags: &Bound<'_, PyAny>) -> PyResult<Vec<(String, f64)>> {
    let tags = extract_tags(tags)?;
    Ok(out_of_range_tags(&tags)
        .into_iter()
        .map(|(key, value)| (key.to_string(), value))
        .collect())
}

#[pymodule]
fn perspectiva_core(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add("SIMILARITY_METRIC_ID", SIMILARITY_METRIC_ID)?;
    m.add_function(wrap_pyfunction!(tag_similarity_py, m)?)?;
    m.add_function(wrap_pyfunction!(out_of_range_tags_py, m)?)?;
    Ok(())
}
