use pyo3::exceptions::PyValueError;
use pyo3::prelude::*;
use pyo3::types::PyBytes;
use pyo3::wrap_pyfunction;

use bazaar_groupcompress::Error;

fn to_py_err(e: Error) -> PyErr {
    PyValueError::new_err(e.to_string())
}

#[pyfunction]
fn encode_base128_int(py: Python, value: u128) -> PyResult<&PyBytes> {
    Ok(PyBytes::new(py, &bazaar_groupcompress::encode_base128_int(value)))
}

#[pyfunction]
fn decode_base128_int(value: Vec<u8>) -> (u128, usize) {
    bazaar_groupcompress::decode_base128_int(&value)
}

#[pyfunction]
fn encode_copy_instruction(py: Python, offset: u64, length: u64) -> PyResult<&PyBytes> {
    let bytes = bazaar_groupcompress::encode_copy_instruction(offset, length).map_err(to_py_err)?;
    Ok(PyBytes::new(py, &bytes))
}

#[pyfunction]
fn decode_copy_instruction(data: Vec<u8>, cmd: u8, pos: usize) -> PyResult<(u64, u64, usize)> {
    bazaar_groupcompress::decode_copy_instruction(&data, cmd, pos).map_err(to_py_err)
}

#[pyfunction]
fn apply_delta(py: Python, basis: Vec<u8>, delta: Vec<u8>) -> PyResult<&PyBytes> {
    let target = bazaar_groupcompress::apply_delta(&basis, &delta).map_err(to_py_err)?;
    Ok(PyBytes::new(py, &target))
}

/// One buffer previously handed to a `DeltaIndex`, in the order it was
/// added. Kept owned (rather than borrowed) so the index can outlive the
/// call that built it, which the underlying `Index<'a>` cannot do on its
/// own: it borrows its source slices for as long as it lives.
enum Source {
    Fulltext(Vec<u8>, u64),
    Delta(Vec<u8>, u64),
}

/// Long-lived match index over one or more source buffers.
///
/// Mirrors `bzrlib.groupcompress.DeltaIndex`: sources are added
/// incrementally with `add_source`/`add_delta_source`, and `make_delta` can
/// be called any number of times afterwards against the accumulated
/// aggregate.
///
/// The Rust [`bazaar_groupcompress::Index`] borrows its source buffers, so
/// it cannot itself live inside a PyO3 object (which must be `'static`).
/// This wrapper keeps the buffers it has been given and rebuilds a fresh
/// `Index` from them on every call; for the buffer counts this format is
/// used with (dozens to low hundreds of revisions) that is cheap relative
/// to the match search itself.
#[pyclass(name = "DeltaIndex")]
struct PyDeltaIndex {
    sources: Vec<Source>,
    max_bytes_to_index: Option<usize>,
}

impl PyDeltaIndex {
    fn rebuild(&self) -> PyResult<bazaar_groupcompress::Index<'_>> {
        let mut index = bazaar_groupcompress::Index::new(self.max_bytes_to_index);
        for source in &self.sources {
            match source {
                Source::Fulltext(buf, unadded) => index.add_source(buf, *unadded).map_err(to_py_err)?,
                Source::Delta(buf, unadded) => index.add_delta_source(buf, *unadded).map_err(to_py_err)?,
            }
        }
        Ok(index)
    }
}

#[pymethods]
impl PyDeltaIndex {
    #[new]
    #[pyo3(signature = (max_bytes_to_index=None))]
    fn new(max_bytes_to_index: Option<usize>) -> Self {
        PyDeltaIndex { sources: Vec::new(), max_bytes_to_index }
    }

    #[pyo3(signature = (source, unadded_bytes=0))]
    fn add_source(&mut self, source: Vec<u8>, unadded_bytes: u64) -> PyResult<()> {
        // Validate eagerly so a bad source is rejected at the call site
        // instead of surfacing on the next make_delta.
        bazaar_groupcompress::Index::new(None)
            .add_source(&source, unadded_bytes)
            .map_err(to_py_err)?;
        self.sources.push(Source::Fulltext(source, unadded_bytes));
        Ok(())
    }

    #[pyo3(signature = (delta, unadded_bytes=0))]
    fn add_delta_source(&mut self, delta: Vec<u8>, unadded_bytes: u64) -> PyResult<()> {
        bazaar_groupcompress::Index::new(None)
            .add_delta_source(&delta, unadded_bytes)
            .map_err(to_py_err)?;
        self.sources.push(Source::Delta(delta, unadded_bytes));
        Ok(())
    }

    #[pyo3(signature = (target, max_delta_size=0))]
    fn make_delta<'p>(&self, py: Python<'p>, target: Vec<u8>, max_delta_size: usize) -> PyResult<Option<&'p PyBytes>> {
        let index = self.rebuild()?;
        let limit = if max_delta_size == 0 { None } else { Some(max_delta_size) };
        let delta = bazaar_groupcompress::make_delta(&index, &target, limit).map_err(to_py_err)?;
        Ok(delta.map(|d| PyBytes::new(py, &d)))
    }

    fn __sizeof__(&self) -> PyResult<u64> {
        Ok(self.rebuild()?.size_in_bytes())
    }
}

#[pymodule]
fn _groupcompress_rs(_: Python, m: &PyModule) -> PyResult<()> {
    m.add_wrapped(wrap_pyfunction!(encode_base128_int))?;
    m.add_wrapped(wrap_pyfunction!(decode_base128_int))?;
    m.add_wrapped(wrap_pyfunction!(apply_delta))?;
    m.add_wrapped(wrap_pyfunction!(decode_copy_instruction))?;
    m.add_wrapped(wrap_pyfunction!(encode_copy_instruction))?;
    m.add_class::<PyDeltaIndex>()?;
    Ok(())
}
