use crate::types::{ConversionDirection, TransferMode};

/// Pick how the engine should hand back a job's output.
///
/// Direct-to-disk is only offered for PDF → CBZ and only when the user asked
/// for it. Output size is unknown until rasterization has finished, so it is
/// never inferred.
pub fn choose(direction: ConversionDirection, direct_to_disk: bool) -> TransferMode {
    match (direction, direct_to_disk) {
        (ConversionDirection::PdfToArchive, true) => TransferMode::DirectToDisk,
        (ConversionDirection::PdfToArchive, false) | (ConversionDirection::ArchiveToPdf, _) => {
            TransferMode::InMemory
        }
    }
}
