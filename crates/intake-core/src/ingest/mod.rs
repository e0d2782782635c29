mod contact;
mod convert;
mod extractor;
mod normalizer;
mod pipeline;
mod validator;

pub use contact::ContactRecoverer;
pub use convert::{
    decode_bytes, Antiword, ConvertError, ConvertResult, ConverterChain, LegacyConverter,
    Pandoc, SofficeToDocx, SofficeToPdf,
};
pub use extractor::{extract_docx_text, ExtractionError, ExtractionResult, TextExtractor};
pub use normalizer::{NormalizeMode, NormalizeStats, TextNormalizer};
pub use pipeline::{ParsedResume, ResumePipeline};
pub use validator::{FileFormat, FormatValidator, ValidationResult};
