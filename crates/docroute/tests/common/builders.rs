//! Builders for test documents and extraction service payloads.

#![allow(dead_code)]

use std::io::Cursor;

use lopdf::{dictionary, Dictionary, Document, Object, Stream, StringFormat};
use serde_json::{json, Value};

/// Builds small PDFs page by page.
///
/// # Example
///
/// ```ignore
/// let bytes = PdfBuilder::new()
///     .text_page("Invoice INV-1 from Acme Supplies")
///     .with_info("Acme Billing", "D:20260601120000")
///     .build();
/// ```
#[derive(Default)]
pub struct PdfBuilder {
    pages: Vec<PageSpec>,
    info: Option<(String, Option<String>)>,
}

struct PageSpec {
    text: Option<String>,
    images: Vec<(u32, u32)>,
}

impl PdfBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn text_page(mut self, text: &str) -> Self {
        self.pages.push(PageSpec {
            text: Some(text.to_string()),
            images: Vec::new(),
        });
        self
    }

    /// A page with JPEG images of the given sizes and no text layer.
    pub fn image_page(mut self, images: &[(u32, u32)]) -> Self {
        self.pages.push(PageSpec {
            text: None,
            images: images.to_vec(),
        });
        self
    }

    pub fn blank_page(mut self) -> Self {
        self.pages.push(PageSpec {
            text: None,
            images: Vec::new(),
        });
        self
    }

    /// Adds an `/Info` dictionary with Producer and, optionally, CreationDate.
    pub fn with_info(mut self, producer: &str, creation_date: &str) -> Self {
        self.info = Some((producer.to_string(), Some(creation_date.to_string())));
        self
    }

    pub fn with_producer_only(mut self, producer: &str) -> Self {
        self.info = Some((producer.to_string(), None));
        self
    }

    pub fn build(self) -> Vec<u8> {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();

        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Helvetica",
        });

        let mut kids = Vec::new();
        for page in &self.pages {
            let mut xobjects = Dictionary::new();
            let mut ops = String::new();

            if let Some(ref text) = page.text {
                ops.push_str(&format!(
                    "BT /F1 10 Tf 20 760 Td ({}) Tj ET\n",
                    text.replace(['(', ')'], "")
                ));
            }

            for (i, (w, h)) in page.images.iter().enumerate() {
                let mut stream = Stream::new(
                    dictionary! {
                        "Type" => "XObject",
                        "Subtype" => "Image",
                        "Width" => *w as i64,
                        "Height" => *h as i64,
                        "ColorSpace" => "DeviceRGB",
                        "BitsPerComponent" => 8,
                        "Filter" => "DCTDecode",
                    },
                    jpeg_bytes(*w, *h),
                );
                stream.allows_compression = false;
                let img_id = doc.add_object(stream);
                let name = format!("Im{}", i);
                xobjects.set(name.as_bytes().to_vec(), Object::Reference(img_id));
                ops.push_str(&format!("q 100 0 0 100 0 0 cm /{} Do Q\n", name));
            }

            let content_id = doc.add_object(Stream::new(dictionary! {}, ops.into_bytes()));
            let page_id = doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
                "Contents" => content_id,
                "Resources" => dictionary! {
                    "Font" => dictionary! { "F1" => font_id },
                    "XObject" => xobjects,
                },
            });
            kids.push(Object::Reference(page_id));
        }

        let count = kids.len() as i64;
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => count,
            }),
        );

        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);

        if let Some((producer, created)) = self.info {
            let mut info = Dictionary::new();
            info.set(
                "Producer",
                Object::String(producer.into_bytes(), StringFormat::Literal),
            );
            if let Some(created) = created {
                info.set(
                    "CreationDate",
                    Object::String(created.into_bytes(), StringFormat::Literal),
                );
            }
            let info_id = doc.add_object(info);
            doc.trailer.set("Info", info_id);
        }

        let mut buf = Vec::new();
        doc.save_to(&mut buf).expect("Failed to serialize test PDF");
        buf
    }
}

/// A text-only invoice PDF with clean metadata.
pub fn invoice_pdf(text: &str) -> Vec<u8> {
    PdfBuilder::new()
        .text_page(text)
        .with_info("Acme Billing 4.2", "D:20260601120000+00'00'")
        .build()
}

pub fn jpeg_bytes(width: u32, height: u32) -> Vec<u8> {
    let img = image::RgbImage::from_pixel(width, height, image::Rgb([200, 180, 160]));
    let mut out = Cursor::new(Vec::new());
    image::DynamicImage::ImageRgb8(img)
        .write_to(&mut out, image::ImageFormat::Jpeg)
        .expect("Failed to encode test JPEG");
    out.into_inner()
}

/// A plain PNG without EXIF.
pub fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    let img = image::RgbImage::from_pixel(width, height, image::Rgb([255, 255, 255]));
    let mut out = Cursor::new(Vec::new());
    image::DynamicImage::ImageRgb8(img)
        .write_to(&mut out, image::ImageFormat::Png)
        .expect("Failed to encode test PNG");
    out.into_inner()
}

/// Builds the JSON object the extraction service answers with.
pub struct PayloadBuilder {
    document_type: String,
    confidence: Option<f64>,
    summary: String,
    fields: Vec<Value>,
}

impl PayloadBuilder {
    pub fn new(document_type: &str) -> Self {
        Self {
            document_type: document_type.to_string(),
            confidence: Some(0.92),
            summary: String::new(),
            fields: Vec::new(),
        }
    }

    pub fn confidence(mut self, confidence: Option<f64>) -> Self {
        self.confidence = confidence;
        self
    }

    pub fn summary(mut self, summary: &str) -> Self {
        self.summary = summary.to_string();
        self
    }

    pub fn field(mut self, key: &str, value: &str) -> Self {
        self.fields.push(json!({ "key": key, "value": value }));
        self
    }

    pub fn field_with_confidence(mut self, key: &str, value: &str, confidence: f64) -> Self {
        self.fields
            .push(json!({ "key": key, "value": value, "confidence": confidence }));
        self
    }

    pub fn build(self) -> String {
        let mut payload = json!({
            "document_type": self.document_type,
            "summary": self.summary,
            "extracted_data": self.fields,
        });
        if let Some(confidence) = self.confidence {
            payload["confidence"] = json!(confidence);
        }
        payload.to_string()
    }

    /// Same payload wrapped in a Markdown code fence.
    pub fn build_fenced(self) -> String {
        format!("```json\n{}\n```", self.build())
    }
}

/// A consistent invoice: 1000 + 180 = 1180.
pub fn clean_invoice_payload() -> String {
    PayloadBuilder::new("Invoice")
        .summary("Consulting invoice from Acme Supplies")
        .field_with_confidence("invoice_number", "INV-2026-0042", 0.97)
        .field_with_confidence("invoice_date", "01/06/2026", 0.95)
        .field_with_confidence("due_date", "30/06/2026", 0.93)
        .field_with_confidence("taxable_value", "1,000.00", 0.94)
        .field_with_confidence("tax_amount", "180.00", 0.92)
        .field_with_confidence("invoice_total", "1,180.00", 0.96)
        .field("vendor_name", "Acme Supplies Ltd")
        .field("po_number", "Not found")
        .build()
}
