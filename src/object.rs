//! PDF object types.

use crate::error::{Error, Result};
use std::collections::HashMap;
use std::io::Read;

/// PDF object representation.
#[derive(Debug, Clone, PartialEq)]
pub enum Object {
    /// Null object
    Null,
    /// Boolean value
    Boolean(bool),
    /// Integer value
    Integer(i64),
    /// Real (floating-point) value
    Real(f64),
    /// String (byte array)
    String(Vec<u8>),
    /// Name (starting with /)
    Name(String),
    /// Array of objects
    Array(Vec<Object>),
    /// Dictionary (key-value pairs)
    Dictionary(HashMap<String, Object>),
    /// Stream (dictionary + raw data)
    Stream {
        /// Stream dictionary
        dict: HashMap<String, Object>,
        /// Raw (still encoded) stream data
        data: bytes::Bytes,
    },
    /// Indirect object reference
    Reference(ObjectRef),
}

/// Reference to an indirect object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObjectRef {
    /// Object number
    pub id: u32,
    /// Generation number
    pub gen: u16,
}

impl ObjectRef {
    /// Create a new object reference.
    pub fn new(id: u32, gen: u16) -> Self {
        Self { id, gen }
    }
}

impl std::fmt::Display for ObjectRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {} R", self.id, self.gen)
    }
}

impl Object {
    /// Get the type name of this object (without data).
    pub fn type_name(&self) -> &'static str {
        match self {
            Object::Null => "Null",
            Object::Boolean(_) => "Boolean",
            Object::Integer(_) => "Integer",
            Object::Real(_) => "Real",
            Object::String(_) => "String",
            Object::Name(_) => "Name",
            Object::Array(_) => "Array",
            Object::Dictionary(_) => "Dictionary",
            Object::Stream { .. } => "Stream",
            Object::Reference(_) => "Reference",
        }
    }

    /// Try to cast to integer.
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Object::Integer(i) => Some(*i),
            _ => None,
        }
    }

    /// Try to cast to a numeric value (integer or real).
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Object::Integer(i) => Some(*i as f64),
            Object::Real(r) => Some(*r),
            _ => None,
        }
    }

    /// Try to cast to name.
    pub fn as_name(&self) -> Option<&str> {
        match self {
            Object::Name(s) => Some(s),
            _ => None,
        }
    }

    /// Try to cast to dictionary. Works for both Dictionary and Stream objects.
    pub fn as_dict(&self) -> Option<&HashMap<String, Object>> {
        match self {
            Object::Dictionary(d) => Some(d),
            Object::Stream { dict, .. } => Some(dict),
            _ => None,
        }
    }

    /// Try to cast to array.
    pub fn as_array(&self) -> Option<&Vec<Object>> {
        match self {
            Object::Array(arr) => Some(arr),
            _ => None,
        }
    }

    /// Try to cast to reference.
    pub fn as_reference(&self) -> Option<ObjectRef> {
        match self {
            Object::Reference(r) => Some(*r),
            _ => None,
        }
    }

    /// Try to cast to string (bytes).
    pub fn as_string(&self) -> Option<&[u8]> {
        match self {
            Object::String(s) => Some(s),
            _ => None,
        }
    }

    /// Try to cast to a stream's (dict, data) pair.
    pub fn as_stream(&self) -> Option<(&HashMap<String, Object>, &bytes::Bytes)> {
        match self {
            Object::Stream { dict, data } => Some((dict, data)),
            _ => None,
        }
    }

    /// Check if object is null.
    pub fn is_null(&self) -> bool {
        matches!(self, Object::Null)
    }

    /// Decode stream data using the filter specified in the stream dictionary.
    ///
    /// The signing engine only reads structural streams (cross-reference
    /// streams and object streams), which are either unfiltered or
    /// FlateDecode-compressed, optionally with a PNG predictor. Other filters
    /// are rejected.
    ///
    /// # Errors
    ///
    /// Returns an error if this is not a stream object, the filter is
    /// unsupported, or decompression fails.
    pub fn decode_stream_data(&self) -> Result<Vec<u8>> {
        let (dict, data) = match self {
            Object::Stream { dict, data } => (dict, data),
            _ => {
                return Err(Error::InvalidPdf(format!(
                    "expected a stream object, found {}",
                    self.type_name()
                )))
            },
        };

        // Some generators leave extra whitespace after the "stream" keyword.
        let data = trim_leading_stream_whitespace(data);

        let filters = dict.get("Filter").map(extract_filter_names).unwrap_or_default();

        let decoded = match filters.as_slice() {
            [] => data.to_vec(),
            [name] if name == "FlateDecode" || name == "Fl" => inflate(data)?,
            [name, ..] => {
                return Err(Error::InvalidPdf(format!(
                    "unsupported stream filter /{} on structural stream",
                    name
                )))
            },
        };

        match extract_predictor(dict.get("DecodeParms")) {
            Some(params) if params.predictor >= 10 => undo_png_predictor(&decoded, &params),
            Some(params) if params.predictor > 1 => Err(Error::InvalidPdf(format!(
                "unsupported predictor {}",
                params.predictor
            ))),
            _ => Ok(decoded),
        }
    }
}

/// PNG predictor parameters from /DecodeParms.
#[derive(Debug, Clone, Copy)]
pub(crate) struct PredictorParams {
    pub predictor: i64,
    pub columns: usize,
    pub colors: usize,
    pub bits_per_component: usize,
}

/// Trim leading PDF whitespace from stream data.
///
/// Stream data begins immediately after the EOL following "stream", but some
/// generators insert extra whitespace (NUL, TAB, LF, FF, CR, SPACE).
fn trim_leading_stream_whitespace(data: &[u8]) -> &[u8] {
    let mut start = 0;
    while start < data.len() {
        match data[start] {
            0x00 | 0x09 | 0x0A | 0x0C | 0x0D | 0x20 => start += 1,
            _ => break,
        }
    }
    &data[start..]
}

/// Extract filter names from a Filter entry (single name or array of names).
fn extract_filter_names(filter_obj: &Object) -> Vec<String> {
    match filter_obj {
        Object::Name(name) => vec![name.clone()],
        Object::Array(arr) => arr
            .iter()
            .filter_map(|obj| obj.as_name().map(|s| s.to_string()))
            .collect(),
        _ => vec![],
    }
}

/// Extract predictor parameters from a DecodeParms entry.
fn extract_predictor(params_obj: Option<&Object>) -> Option<PredictorParams> {
    let dict = match params_obj? {
        Object::Dictionary(d) => d,
        Object::Array(arr) => arr.iter().filter_map(|obj| obj.as_dict()).next()?,
        _ => return None,
    };

    Some(PredictorParams {
        predictor: dict.get("Predictor").and_then(|o| o.as_integer()).unwrap_or(1),
        columns: dict.get("Columns").and_then(|o| o.as_integer()).unwrap_or(1) as usize,
        colors: dict.get("Colors").and_then(|o| o.as_integer()).unwrap_or(1) as usize,
        bits_per_component: dict
            .get("BitsPerComponent")
            .and_then(|o| o.as_integer())
            .unwrap_or(8) as usize,
    })
}

/// Inflate zlib-wrapped data, falling back to raw deflate for streams with
/// damaged or missing zlib headers.
fn inflate(data: &[u8]) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    match flate2::read::ZlibDecoder::new(data).read_to_end(&mut out) {
        Ok(_) => Ok(out),
        Err(zlib_err) => {
            log::warn!("zlib inflate failed ({}), retrying as raw deflate", zlib_err);
            out.clear();
            flate2::read::DeflateDecoder::new(data)
                .read_to_end(&mut out)
                .map_err(|e| Error::InvalidPdf(format!("FlateDecode failed: {}", e)))?;
            Ok(out)
        },
    }
}

/// Undo a PNG row predictor (predictors 10..=15).
///
/// Each row carries a leading filter-type byte followed by `row_len` bytes of
/// filtered data; the filter type may vary per row.
fn undo_png_predictor(data: &[u8], params: &PredictorParams) -> Result<Vec<u8>> {
    let bpp = (params.colors * params.bits_per_component).div_ceil(8).max(1);
    let row_len = (params.columns * params.colors * params.bits_per_component).div_ceil(8);
    if row_len == 0 {
        return Err(Error::InvalidPdf("predictor row length is zero".to_string()));
    }

    let stride = row_len + 1;
    if !data.len().is_multiple_of(stride) {
        return Err(Error::InvalidPdf(format!(
            "predicted data length {} is not a multiple of row stride {}",
            data.len(),
            stride
        )));
    }

    let mut out = Vec::with_capacity(data.len() / stride * row_len);
    let mut prev_row = vec![0u8; row_len];

    for chunk in data.chunks(stride) {
        let filter_type = chunk[0];
        let mut row = chunk[1..].to_vec();

        match filter_type {
            0 => {},
            1 => {
                // Sub
                for i in bpp..row_len {
                    row[i] = row[i].wrapping_add(row[i - bpp]);
                }
            },
            2 => {
                // Up
                for i in 0..row_len {
                    row[i] = row[i].wrapping_add(prev_row[i]);
                }
            },
            3 => {
                // Average
                for i in 0..row_len {
                    let left = if i >= bpp { row[i - bpp] as u16 } else { 0 };
                    let up = prev_row[i] as u16;
                    row[i] = row[i].wrapping_add(((left + up) / 2) as u8);
                }
            },
            4 => {
                // Paeth
                for i in 0..row_len {
                    let left = if i >= bpp { row[i - bpp] as i16 } else { 0 };
                    let up = prev_row[i] as i16;
                    let up_left = if i >= bpp { prev_row[i - bpp] as i16 } else { 0 };
                    let p = left + up - up_left;
                    let (pa, pb, pc) = ((p - left).abs(), (p - up).abs(), (p - up_left).abs());
                    let predictor = if pa <= pb && pa <= pc {
                        left
                    } else if pb <= pc {
                        up
                    } else {
                        up_left
                    };
                    row[i] = row[i].wrapping_add(predictor as u8);
                }
            },
            t => {
                return Err(Error::InvalidPdf(format!("unknown PNG filter type {}", t)));
            },
        }

        out.extend_from_slice(&row);
        prev_row = row;
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_object_integer() {
        let obj = Object::Integer(42);
        assert_eq!(obj.as_integer(), Some(42));
        assert!(obj.as_name().is_none());
        assert!(!obj.is_null());
    }

    #[test]
    fn test_object_number_coercion() {
        assert_eq!(Object::Integer(250).as_number(), Some(250.0));
        assert_eq!(Object::Real(5.5).as_number(), Some(5.5));
        assert!(Object::Null.as_number().is_none());
    }

    #[test]
    fn test_object_name() {
        let obj = Object::Name("Type".to_string());
        assert_eq!(obj.as_name(), Some("Type"));
        assert!(obj.as_integer().is_none());
    }

    #[test]
    fn test_object_stream_dict_access() {
        let mut dict = HashMap::new();
        dict.insert("Length".to_string(), Object::Integer(100));
        let obj = Object::Stream {
            dict,
            data: bytes::Bytes::from_static(b"stream data"),
        };

        let d = obj.as_dict().unwrap();
        assert_eq!(d.get("Length").unwrap().as_integer(), Some(100));
    }

    #[test]
    fn test_object_ref_display() {
        assert_eq!(format!("{}", ObjectRef::new(10, 0)), "10 0 R");
    }

    #[test]
    fn test_object_ref_hash() {
        use std::collections::HashSet;
        let mut set = HashSet::new();
        set.insert(ObjectRef::new(1, 0));
        set.insert(ObjectRef::new(2, 0));
        set.insert(ObjectRef::new(1, 0));
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_decode_stream_no_filter() {
        let mut dict = HashMap::new();
        dict.insert("Length".to_string(), Object::Integer(5));
        let obj = Object::Stream {
            dict,
            data: bytes::Bytes::from_static(b"Hello"),
        };

        assert_eq!(obj.decode_stream_data().unwrap(), b"Hello");
    }

    #[test]
    fn test_decode_stream_flate() {
        let mut enc = flate2::write::ZlibEncoder::new(Vec::new(), flate2::Compression::default());
        enc.write_all(b"xref stream payload").unwrap();
        let compressed = enc.finish().unwrap();

        let mut dict = HashMap::new();
        dict.insert("Filter".to_string(), Object::Name("FlateDecode".to_string()));
        let obj = Object::Stream {
            dict,
            data: bytes::Bytes::from(compressed),
        };

        assert_eq!(obj.decode_stream_data().unwrap(), b"xref stream payload");
    }

    #[test]
    fn test_decode_stream_unsupported_filter() {
        let mut dict = HashMap::new();
        dict.insert("Filter".to_string(), Object::Name("DCTDecode".to_string()));
        let obj = Object::Stream {
            dict,
            data: bytes::Bytes::from_static(b"\xff\xd8"),
        };

        assert!(matches!(obj.decode_stream_data(), Err(Error::InvalidPdf(_))));
    }

    #[test]
    fn test_decode_stream_not_a_stream() {
        assert!(Object::Integer(42).decode_stream_data().is_err());
    }

    #[test]
    fn test_png_predictor_up() {
        // Two rows of 4 bytes, both using the Up filter. Row 1 adds to a zero
        // previous row, row 2 adds to row 1.
        let params = PredictorParams {
            predictor: 12,
            columns: 4,
            colors: 1,
            bits_per_component: 8,
        };
        let data = [2u8, 1, 2, 3, 4, 2, 1, 1, 1, 1];
        let out = undo_png_predictor(&data, &params).unwrap();
        assert_eq!(out, vec![1, 2, 3, 4, 2, 3, 4, 5]);
    }

    #[test]
    fn test_png_predictor_sub() {
        let params = PredictorParams {
            predictor: 12,
            columns: 4,
            colors: 1,
            bits_per_component: 8,
        };
        let data = [1u8, 10, 1, 1, 1];
        let out = undo_png_predictor(&data, &params).unwrap();
        assert_eq!(out, vec![10, 11, 12, 13]);
    }

    #[test]
    fn test_png_predictor_bad_stride() {
        let params = PredictorParams {
            predictor: 12,
            columns: 4,
            colors: 1,
            bits_per_component: 8,
        };
        assert!(undo_png_predictor(&[0u8; 7], &params).is_err());
    }
}
