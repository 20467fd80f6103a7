//! PDF inspection with lopdf: text per page, embedded image XObjects, the
//! document information dictionary and a best-effort page count.

use std::collections::BTreeSet;
use std::process::Command;

use lopdf::{Dictionary, Document, Object, ObjectId};

use crate::error::ProcessError;
use crate::processor::Bitmap;

/// An embedded image that could be decoded, with the page it sits on.
#[derive(Debug, Clone)]
pub struct EmbeddedImage {
    pub page: u32,
    pub bitmap: Bitmap,
}

/// Entries of the `/Info` dictionary used by the integrity checks.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PdfInfo {
    pub producer: Option<String>,
    pub creator: Option<String>,
    pub creation_date: Option<String>,
    pub mod_date: Option<String>,
}

pub fn load(bytes: &[u8]) -> Result<Document, ProcessError> {
    Document::load_mem(bytes)
        .map_err(|e| ProcessError::PdfProcessing(format!("Failed to load PDF: {}", e)))
}

pub fn page_count(doc: &Document) -> usize {
    doc.get_pages().len()
}

/// Concatenates the text of every page in page order.
///
/// Pages whose text cannot be decoded (unsupported font encodings) count as
/// empty rather than failing the document.
pub fn extract_text(doc: &Document) -> String {
    let mut text = String::new();

    for (page_num, _) in doc.get_pages() {
        match doc.extract_text(&[page_num]) {
            Ok(page_text) => {
                text.push_str(&page_text);
                text.push('\n');
            }
            Err(e) => {
                tracing::debug!(page = page_num, error = %e, "Skipping undecodable page text");
            }
        }
    }

    text
}

/// Decodes every image XObject referenced from each page's resources.
///
/// An XObject shared by several pages is reported once for every page that
/// references it; repeats within one page count once. Images that cannot be
/// decoded are skipped.
pub fn extract_images(doc: &Document) -> Vec<EmbeddedImage> {
    let mut images = Vec::new();

    for (page_num, page_id) in doc.get_pages() {
        let mut seen: BTreeSet<ObjectId> = BTreeSet::new();
        for (object_id, stream) in page_image_streams(doc, page_id) {
            if let Some(id) = object_id {
                if !seen.insert(id) {
                    continue;
                }
            }
            match decode_image_stream(doc, stream) {
                Ok(bitmap) => images.push(EmbeddedImage {
                    page: page_num,
                    bitmap,
                }),
                Err(e) => {
                    tracing::debug!(page = page_num, error = %e, "Skipping undecodable image");
                }
            }
        }
    }

    images
}

/// Reads `/Info` from the trailer. `None` when the document has none.
pub fn read_info(doc: &Document) -> Option<PdfInfo> {
    let info_obj = doc.trailer.get(b"Info").ok()?;
    let info = resolve_object(doc, info_obj).as_dict().ok()?;

    Some(PdfInfo {
        producer: dict_string(info, b"Producer"),
        creator: dict_string(info, b"Creator"),
        creation_date: dict_string(info, b"CreationDate"),
        mod_date: dict_string(info, b"ModDate"),
    })
}

/// Page count for cost estimation. Never fails: falls back to `pdfinfo`
/// when lopdf cannot parse the file, and to 1 when nothing works.
pub fn estimate_page_count(bytes: &[u8]) -> usize {
    if let Ok(doc) = Document::load_mem(bytes) {
        let count = page_count(&doc);
        if count > 0 {
            return count;
        }
    }

    match count_pages_with_pdfinfo(bytes) {
        Ok(count) if count > 0 => count,
        Ok(_) => 1,
        Err(e) => {
            tracing::warn!("Page count detection failed, assuming 1 page: {}", e);
            1
        }
    }
}

fn count_pages_with_pdfinfo(bytes: &[u8]) -> Result<usize, ProcessError> {
    let temp_dir = tempfile::tempdir()
        .map_err(|e| ProcessError::PdfProcessing(format!("Failed to create temp dir: {}", e)))?;
    let pdf_path = temp_dir.path().join("pagecount.pdf");

    std::fs::write(&pdf_path, bytes)
        .map_err(|e| ProcessError::PdfProcessing(format!("Failed to write temp PDF: {}", e)))?;

    let output = Command::new("pdfinfo").arg(&pdf_path).output().map_err(|e| {
        ProcessError::PdfProcessing(format!(
            "Failed to run pdfinfo: {}. Make sure poppler-utils is installed.",
            e
        ))
    })?;

    if !output.status.success() {
        return Err(ProcessError::PdfProcessing(format!(
            "pdfinfo failed: {}",
            String::from_utf8_lossy(&output.stderr)
        )));
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    Ok(parse_pdfinfo_pages(&stdout).unwrap_or(1))
}

fn parse_pdfinfo_pages(stdout: &str) -> Option<usize> {
    stdout
        .lines()
        .find_map(|line| line.strip_prefix("Pages:"))
        .and_then(|count| count.trim().parse::<usize>().ok())
}

/// Image streams under `/Resources /XObject` of one page, with their
/// object id when referenced indirectly.
fn page_image_streams(doc: &Document, page_id: ObjectId) -> Vec<(Option<ObjectId>, &lopdf::Stream)> {
    let mut streams = Vec::new();

    let Some(page_dict) = doc.get_object(page_id).ok().and_then(|o| o.as_dict().ok()) else {
        return streams;
    };
    let Some(resources) = resolve_dict_entry(doc, page_dict, b"Resources") else {
        return streams;
    };
    let Some(xobjects) = resolve_dict_entry(doc, resources, b"XObject") else {
        return streams;
    };

    for (_name, obj_ref) in xobjects.iter() {
        let (id, xobj) = match obj_ref {
            Object::Reference(id) => match doc.get_object(*id) {
                Ok(obj) => (Some(*id), obj),
                Err(_) => continue,
            },
            other => (None, other),
        };

        if let Object::Stream(ref stream) = xobj {
            if is_image_subtype(&stream.dict) {
                streams.push((id, stream));
            }
        }
    }

    streams
}

fn is_image_subtype(dict: &Dictionary) -> bool {
    dict.get(b"Subtype")
        .map(|obj| matches!(obj, Object::Name(ref n) if n == b"Image"))
        .unwrap_or(false)
}

fn has_filter(dict: &Dictionary, name: &[u8]) -> bool {
    dict.get(b"Filter")
        .map(|f| match f {
            Object::Name(n) => n == name,
            Object::Array(arr) => arr
                .iter()
                .any(|o| matches!(o, Object::Name(ref n) if n == name)),
            _ => false,
        })
        .unwrap_or(false)
}

fn decode_image_stream(doc: &Document, stream: &lopdf::Stream) -> Result<Bitmap, ProcessError> {
    if has_filter(&stream.dict, b"DCTDecode") {
        // The stream body is a complete JPEG file once any outer filters
        // in the chain are removed.
        let content = stream
            .decompressed_content()
            .unwrap_or_else(|_| stream.content.clone());
        return crate::processor::image::decode_any(&content);
    }
    if has_filter(&stream.dict, b"JPXDecode") {
        return Err(ProcessError::ImageProcessing(
            "JPEG 2000 images are not supported".to_string(),
        ));
    }

    let content = stream
        .decompressed_content()
        .unwrap_or_else(|_| stream.content.clone());

    if let Ok(bitmap) = crate::processor::image::decode_any(&content) {
        return Ok(bitmap);
    }

    reconstruct_raw_image(doc, &stream.dict, &content)
}

/// Rebuilds a bitmap from raw samples using `/Width`, `/Height`,
/// `/BitsPerComponent` and `/ColorSpace`. Only 8-bit samples are handled.
fn reconstruct_raw_image(
    doc: &Document,
    dict: &Dictionary,
    raw: &[u8],
) -> Result<Bitmap, ProcessError> {
    let width = get_int(dict, b"Width")?;
    let height = get_int(dict, b"Height")?;
    if width <= 0 || height <= 0 {
        return Err(ProcessError::ImageProcessing(format!(
            "Invalid image dimensions {}x{}",
            width, height
        )));
    }
    let (width, height) = match (u32::try_from(width), u32::try_from(height)) {
        (Ok(w), Ok(h)) => (w, h),
        _ => {
            return Err(ProcessError::ImageProcessing(format!(
                "Image dimensions out of range: {}x{}",
                width, height
            )))
        }
    };

    let bpc = get_int(dict, b"BitsPerComponent").unwrap_or(8);
    if bpc != 8 {
        return Err(ProcessError::ImageProcessing(format!(
            "Unsupported bits per component: {}",
            bpc
        )));
    }

    let channels = color_channels(doc, dict);
    if !matches!(channels, 1 | 3 | 4) {
        return Err(ProcessError::ImageProcessing(format!(
            "Unsupported channel count: {}",
            channels
        )));
    }
    let (pixels, expected) = match (width as usize).checked_mul(height as usize) {
        Some(pixels) => match pixels.checked_mul(channels) {
            Some(expected) => (pixels, expected),
            None => {
                return Err(ProcessError::ImageProcessing(format!(
                    "Image too large: {}x{}x{}",
                    width, height, channels
                )))
            }
        },
        None => {
            return Err(ProcessError::ImageProcessing(format!(
                "Image too large: {}x{}",
                width, height
            )))
        }
    };
    if raw.len() < expected {
        return Err(ProcessError::ImageProcessing(format!(
            "Raw pixel buffer too small: {} bytes, expected {} ({}x{}x{})",
            raw.len(),
            expected,
            width,
            height,
            channels
        )));
    }

    let rgb: Vec<u8> = match channels {
        1 => raw[..pixels].iter().flat_map(|&g| [g, g, g]).collect(),
        3 => raw[..expected].to_vec(),
        4 => raw[..expected]
            .chunks_exact(4)
            .flat_map(|px| cmyk_to_rgb(px[0], px[1], px[2], px[3]))
            .collect(),
        other => {
            return Err(ProcessError::ImageProcessing(format!(
                "Unsupported channel count: {}",
                other
            )))
        }
    };

    Bitmap::from_raw(width, height, rgb)
        .ok_or_else(|| ProcessError::ImageProcessing("Failed to build RGB image".to_string()))
}

fn cmyk_to_rgb(c: u8, m: u8, y: u8, k: u8) -> [u8; 3] {
    let k = 255 - u16::from(k);
    let channel = |v: u8| ((255 - u16::from(v)) * k / 255) as u8;
    [channel(c), channel(m), channel(y)]
}

fn color_channels(doc: &Document, dict: &Dictionary) -> usize {
    let cs = match dict.get(b"ColorSpace") {
        Ok(obj) => resolve_object(doc, obj),
        Err(_) => return 3,
    };

    match cs {
        Object::Name(ref n) => match n.as_slice() {
            b"DeviceGray" | b"CalGray" => 1,
            b"DeviceCMYK" => 4,
            _ => 3,
        },
        Object::Array(ref arr) if !arr.is_empty() => match &arr[0] {
            Object::Name(ref n) if n == b"ICCBased" => arr
                .get(1)
                .map(|o| resolve_object(doc, o))
                .and_then(|o| match o {
                    Object::Stream(ref s) => get_int(&s.dict, b"N").ok(),
                    _ => None,
                })
                // Anything but 1, 3 or 4 components is rejected by the caller.
                .map(|n| match n {
                    1 | 3 | 4 => n as usize,
                    _ => 0,
                })
                .unwrap_or(3),
            Object::Name(ref n) if n == b"Indexed" => 0,
            _ => 3,
        },
        _ => 3,
    }
}

fn resolve_object<'a>(doc: &'a Document, obj: &'a Object) -> &'a Object {
    match obj {
        Object::Reference(id) => doc.get_object(*id).unwrap_or(obj),
        _ => obj,
    }
}

fn resolve_dict_entry<'a>(doc: &'a Document, dict: &'a Dictionary, key: &[u8]) -> Option<&'a Dictionary> {
    let obj = dict.get(key).ok()?;
    resolve_object(doc, obj).as_dict().ok()
}

fn get_int(dict: &Dictionary, key: &[u8]) -> Result<i64, ProcessError> {
    dict.get(key)
        .and_then(|o| o.as_i64())
        .map_err(|_| {
            ProcessError::ImageProcessing(format!(
                "Missing or invalid /{} in image dictionary",
                String::from_utf8_lossy(key)
            ))
        })
}

fn dict_string(dict: &Dictionary, key: &[u8]) -> Option<String> {
    match dict.get(key).ok()? {
        Object::String(bytes, _) => Some(decode_pdf_string(bytes)),
        Object::Name(name) => Some(String::from_utf8_lossy(name).to_string()),
        _ => None,
    }
}

/// PDF text strings are either UTF-16BE with a BOM or PDFDocEncoding,
/// which is close enough to Latin-1 for editor names and dates.
fn decode_pdf_string(bytes: &[u8]) -> String {
    if let Some(utf16) = bytes.strip_prefix(&[0xFE, 0xFF]) {
        let units: Vec<u16> = utf16
            .chunks_exact(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
            .collect();
        return String::from_utf16_lossy(&units);
    }
    bytes.iter().map(|&b| b as char).collect()
}
