use super::instruction::Instruction;
use crate::error::PrepError;
use crate::vision::{ImagePayload, Prompt, VisionService};
use image::DynamicImage;
use sha2::{Digest, Sha256};

const SYSTEM_PROMPT: &str = "You design image preprocessing programs that make \
photographed documents easier to read for text recognition. You reply with JSON only.";

/// Identity of the image a program was generated for
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceImage {
    /// Hex SHA-256 of the encoded upload
    pub digest: String,
    pub width: u32,
    pub height: u32,
}

impl SourceImage {
    pub fn of(bytes: &[u8], image: &DynamicImage) -> Self {
        Self {
            digest: hex_digest(bytes),
            width: image.width(),
            height: image.height(),
        }
    }
}

/// Raw model reply bound to the image it was generated for. A program is
/// only ever executed against that image.
#[derive(Debug, Clone)]
pub struct GeneratedProgram {
    pub source: String,
    pub image: SourceImage,
}

impl GeneratedProgram {
    pub fn is_for(&self, bytes: &[u8], image: &DynamicImage) -> bool {
        self.image == SourceImage::of(bytes, image)
    }
}

/// Ask the service for a transform program tailored to this image
pub fn generate(
    service: &dyn VisionService,
    bytes: &[u8],
    image: &DynamicImage,
) -> Result<GeneratedProgram, PrepError> {
    let source_image = SourceImage::of(bytes, image);
    let instruction = instruction_for(&source_image);

    tracing::debug!(
        "Requesting program from {} for image {} ({}x{})",
        service.name(),
        &source_image.digest[..12],
        source_image.width,
        source_image.height
    );

    let source = service.generate(Prompt {
        system: Some(SYSTEM_PROMPT),
        instruction: &instruction,
        image: Some(ImagePayload::sniff(bytes)),
    })?;

    Ok(GeneratedProgram {
        source,
        image: source_image,
    })
}

fn instruction_for(image: &SourceImage) -> String {
    format!(
        "Analyze the attached {}x{} image and write a preprocessing program that improves \
text recognition on it. The working image starts as the original. Steps run in order, \
each transforming the working image. Available steps:\n{}\n\n\
Reply with a JSON object of the form {{\"steps\": [...]}}. The program must end by \
using \"output\" to designate its result.",
        image.width,
        image.height,
        Instruction::vocabulary()
    )
}

fn hex_digest(bytes: &[u8]) -> String {
    Sha256::digest(bytes)
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect()
}
