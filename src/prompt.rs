//! Request building: final prompt text, image payload and the chat completion body.

use std::fmt;
use std::str::FromStr;

use base64::{engine::general_purpose, Engine as _};
use serde::{Deserialize, Serialize};

/// Marker the model is told to use for cells or passages it cannot read.
pub const ILLEGIBLE_MARKER: &str = "illegible";

pub const DEFAULT_PROMPT_EXCEL: &str = "Convert this image into a spreadsheet that matches the original layout as closely as possible.
Do not reorganize, reinterpret or paraphrase any text.
If something cannot be read clearly, put the word \"illegible\" in its cell.
Even when there is no clear column and row structure, make the spreadsheet look like the image, keeping texts in their original relative positions (alignment, spacing, separate sections, etc.).
Do not fix typos or fill in anything that is not explicitly in the image.
Be as faithful as possible to the layout, as if it were an exact visual reconstruction.";

pub const DEFAULT_PROMPT_DOCS: &str = "Extract all readable text from the image exactly as it appears, without paraphrasing or fixing mistakes.
If some parts are illegible, mark them with the word \"illegible\".
Do not include any text beyond the extracted content.
The result must be ready to copy and paste into a text document.";

const EXCEL_FORMAT_SUFFIX: &str = "Answer only in TSV (tab-separated values) format: each line is one table row and columns are separated by a tab character. Do not include any text outside the table. Example:
Quantity\tPrice\tSubtotal
4.0000\t9.93\t39.72
2.0000\t8.94\t17.88

If a column or row does not match what you see in the image, you may leave cells empty; filling every cell is not required. Write \"illegible\" in any cell you cannot read.";

const DOCS_FORMAT_SUFFIX: &str = "Extract all readable text from the image exactly as it appears, without paraphrasing or fixing mistakes. If some parts are illegible, mark them with the word \"illegible\". Do not include any text beyond the extracted content. The result must be ready to copy and paste into a text document.";

/// What the model is asked to produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum OutputMode {
    /// Tab-separated table for spreadsheets.
    #[default]
    Excel,
    /// Plain text for documents.
    Docs,
}

impl OutputMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Excel => "Excel",
            Self::Docs => "Docs",
        }
    }

    fn format_suffix(&self) -> &'static str {
        match self {
            Self::Excel => EXCEL_FORMAT_SUFFIX,
            Self::Docs => DOCS_FORMAT_SUFFIX,
        }
    }
}

impl fmt::Display for OutputMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OutputMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "excel" | "table" | "tsv" => Ok(Self::Excel),
            "docs" | "text" => Ok(Self::Docs),
            other => Err(format!("unknown output mode '{other}' (expected excel or docs)")),
        }
    }
}

/// Exact table size requested from the model. Both values are strictly positive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableDimensions {
    pub columns: u32,
    pub rows: u32,
}

impl TableDimensions {
    pub fn new(columns: u32, rows: u32) -> Option<Self> {
        (columns > 0 && rows > 0).then_some(Self { columns, rows })
    }

    /// Parses user-typed column and row counts. Anything but positive digit strings is rejected.
    pub fn parse(columns: &str, rows: &str) -> Option<Self> {
        fn digits(s: &str) -> Option<u32> {
            let s = s.trim();
            if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
                return None;
            }
            s.parse().ok()
        }
        Self::new(digits(columns)?, digits(rows)?)
    }
}

/// Composes the final prompt: user instruction, mode-specific format rules and, for tables,
/// an optional exact-size constraint.
pub fn build_prompt(
    user_prompt: &str,
    mode: OutputMode,
    dimensions: Option<TableDimensions>,
) -> String {
    let mut prompt = format!("{}\n\n{}", user_prompt.trim(), mode.format_suffix());
    if let (OutputMode::Excel, Some(dims)) = (mode, dimensions) {
        prompt.push_str(&format!(
            "\n\nAdditional instruction: the table must have exactly {} columns and {} rows.",
            dims.columns, dims.rows
        ));
    }
    prompt
}

pub fn encode_png_base64(png: &[u8]) -> String {
    general_purpose::STANDARD.encode(png)
}

pub fn image_data_url(png: &[u8]) -> String {
    format!("data:image/png;base64,{}", encode_png_base64(png))
}

/// Body of a chat completion request carrying one text part and one image part.
#[derive(Debug, Clone, Serialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatMessage {
    pub role: &'static str,
    pub content: Vec<ContentPart>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: String },
}

impl ChatRequest {
    pub fn new(model_id: &str, prompt: String, png: &[u8]) -> Self {
        Self {
            model: model_id.to_string(),
            messages: vec![ChatMessage {
                role: "user",
                content: vec![
                    ContentPart::Text { text: prompt },
                    ContentPart::ImageUrl {
                        image_url: image_data_url(png),
                    },
                ],
            }],
        }
    }
}
