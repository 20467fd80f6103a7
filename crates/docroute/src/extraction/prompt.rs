//! Structured-output prompt sent with every extraction request.

/// Value the service uses for a field it could not read with confidence.
pub const NOT_FOUND: &str = "Not found";

pub const FIELD_EXTRACTION_PROMPT: &str = r#"You are a document analyst. Read the document and return a single JSON object with exactly this shape:

{
  "document_type": "short classification such as Invoice, Receipt, Sale Deed, Bank Statement or ID Card",
  "confidence": 0.0,
  "extracted_data": [
    {"key": "Descriptive Field Name", "value": "value exactly as printed"}
  ],
  "summary": "two or three sentences naming the parties, purpose, key dates and amounts"
}

Rules:
- "confidence" is your confidence in the whole extraction, between 0.0 and 1.0.
- Extract every relevant key-value pair. Prefer descriptive keys ("Invoice Number", "Total Amount", "Invoice Date", "Due Date", "Vendor Name", "Customer Name", "Taxable Value", "Tax Amount").
- Copy values exactly as they appear, including the original script for non-Latin text.
- Use "Not found" for any field you are not sure about.
- Include only information present in the document.
- Respond with the JSON object only, without commentary."#;

pub fn text_prompt(text: &str) -> String {
    format!("{}\n\n--- DOCUMENT TEXT ---\n{}", FIELD_EXTRACTION_PROMPT, text)
}

pub fn vision_prompt(context: Option<&str>) -> String {
    match context {
        Some(text) if !text.trim().is_empty() => format!(
            "{}\n\nText already extracted from this document, for context:\n{}",
            FIELD_EXTRACTION_PROMPT,
            text.trim()
        ),
        _ => FIELD_EXTRACTION_PROMPT.to_string(),
    }
}
