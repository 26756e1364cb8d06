//! Instruction text and ordered part lists for each generation task.
//!
//! Part order matters: the guideline text refers to "IMAGE 1" as the identity,
//! pose and background reference, so the subject is always emitted first and
//! absent inputs are skipped rather than padded.

use studio_contracts::assets::{ImageAsset, ImageRole};
use studio_contracts::options::AspectRatio;

use crate::encoder::{encode, EncodedPayload};

const TRY_ON_GUIDELINES: &str = "A high-quality professional studio photograph.
The person from IMAGE 1 is now wearing the exact clothing items shown in the following reference images.
The person's facial features, pose, hair and background from IMAGE 1 must remain exactly the same.
The clothing must fit the person's body shape naturally.";

const BACKGROUND_GUIDELINES: &str = "Keep the subject identical.";

const CUSTOM_BACKGROUND_TARGET: &str = "the reference environment";

pub const OUTFIT_ANALYSIS_INSTRUCTION: &str =
    "Describe this outfit for high-quality video generation.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Part {
    Image {
        role: ImageRole,
        payload: EncodedPayload,
    },
    Text(String),
}

impl Part {
    fn image(role: ImageRole, asset: &ImageAsset) -> Self {
        Self::Image {
            role,
            payload: encode(asset),
        }
    }

    pub fn role(&self) -> Option<ImageRole> {
        match self {
            Self::Image { role, .. } => Some(*role),
            Self::Text(_) => None,
        }
    }

    pub fn text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            Self::Image { .. } => None,
        }
    }
}

fn push_optional(parts: &mut Vec<Part>, role: ImageRole, asset: Option<&ImageAsset>) {
    if let Some(asset) = asset {
        parts.push(Part::image(role, asset));
    }
}

pub fn compose_try_on(
    subject: &ImageAsset,
    garment: Option<&ImageAsset>,
    garment_detail: Option<&ImageAsset>,
    accessory: Option<&ImageAsset>,
    style_note: &str,
    aspect_ratio: AspectRatio,
) -> Vec<Part> {
    let mut parts = vec![Part::image(ImageRole::Subject, subject)];
    push_optional(&mut parts, ImageRole::Garment, garment);
    push_optional(&mut parts, ImageRole::GarmentDetail, garment_detail);
    push_optional(&mut parts, ImageRole::Accessory, accessory);

    let mut instruction = format!("{TRY_ON_GUIDELINES}\nAspect ratio: {aspect_ratio}.");
    let style_note = style_note.trim();
    if !style_note.is_empty() {
        instruction.push_str(&format!("\nStyle guidance: {style_note}"));
    }
    parts.push(Part::Text(instruction));
    parts
}

pub fn compose_background_change(
    subject: &ImageAsset,
    detail: Option<&ImageAsset>,
    custom_background: Option<&ImageAsset>,
    prompt_text: &str,
    aspect_ratio: AspectRatio,
) -> Vec<Part> {
    let mut parts = vec![Part::image(ImageRole::Subject, subject)];
    push_optional(&mut parts, ImageRole::GarmentDetail, detail);
    push_optional(&mut parts, ImageRole::CustomBackground, custom_background);

    let target = if custom_background.is_some() {
        CUSTOM_BACKGROUND_TARGET
    } else {
        prompt_text.trim()
    };
    parts.push(Part::Text(format!(
        "{BACKGROUND_GUIDELINES} Replace the background with: {target}.\nAspect ratio: {aspect_ratio}."
    )));
    parts
}

pub fn compose_outfit_analysis(image: &ImageAsset, detail: Option<&ImageAsset>) -> Vec<Part> {
    let mut parts = vec![Part::image(ImageRole::Subject, image)];
    push_optional(&mut parts, ImageRole::GarmentDetail, detail);
    parts.push(Part::Text(OUTFIT_ANALYSIS_INSTRUCTION.to_string()));
    parts
}

/// Prompt for text-only image models, which cannot see the input photos.
pub fn compose_text_only_try_on(style_note: &str) -> String {
    let subject = match style_note.trim() {
        "" => "this garment",
        note => note,
    };
    format!(
        "A professional full body photograph of a person wearing {subject}. High fashion style, 4k resolution, studio lighting."
    )
}

pub fn prompt_list_instruction(count: usize) -> String {
    format!(
        "Generate {count} video motion prompts for this outfit. Return JSON {{ \"prompts\": [] }}."
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn asset(id: &str) -> ImageAsset {
        ImageAsset::new(id, format!("data:image/png;base64,{id}"), "image/png")
    }

    fn roles(parts: &[Part]) -> Vec<Option<ImageRole>> {
        parts.iter().map(Part::role).collect()
    }

    #[test]
    fn try_on_emits_subject_first_and_text_last() {
        let parts = compose_try_on(
            &asset("person"),
            Some(&asset("shirt")),
            Some(&asset("collar")),
            Some(&asset("bag")),
            "",
            AspectRatio::PORTRAIT,
        );
        assert_eq!(
            roles(&parts),
            vec![
                Some(ImageRole::Subject),
                Some(ImageRole::Garment),
                Some(ImageRole::GarmentDetail),
                Some(ImageRole::Accessory),
                None,
            ]
        );
        match &parts[0] {
            Part::Image { payload, .. } => assert_eq!(payload.data, "person"),
            Part::Text(_) => panic!("subject must come first"),
        }
    }

    #[test]
    fn try_on_without_garment_has_no_placeholder() {
        let parts = compose_try_on(
            &asset("person"),
            None,
            None,
            Some(&asset("bag")),
            "",
            AspectRatio::PORTRAIT,
        );
        assert_eq!(
            roles(&parts),
            vec![Some(ImageRole::Subject), Some(ImageRole::Accessory), None]
        );
    }

    #[test]
    fn try_on_instruction_embeds_ratio_and_optional_style_note() {
        let with_note = compose_try_on(
            &asset("p"),
            Some(&asset("g")),
            None,
            None,
            "  loose fit, rolled sleeves ",
            AspectRatio::SQUARE,
        );
        let text = with_note.last().and_then(Part::text).unwrap_or_default();
        assert!(text.starts_with("A high-quality professional studio photograph."));
        assert!(text.contains("Aspect ratio: 1:1."));
        assert!(text.ends_with("Style guidance: loose fit, rolled sleeves"));

        let without_note =
            compose_try_on(&asset("p"), Some(&asset("g")), None, None, "   ", AspectRatio::SQUARE);
        let text = without_note.last().and_then(Part::text).unwrap_or_default();
        assert!(!text.contains("Style guidance"));
    }

    #[test]
    fn background_uses_literal_prompt_without_reference() {
        let parts = compose_background_change(
            &asset("p"),
            None,
            None,
            "a rainy Tokyo street",
            AspectRatio::PORTRAIT,
        );
        assert_eq!(roles(&parts), vec![Some(ImageRole::Subject), None]);
        let text = parts.last().and_then(Part::text).unwrap_or_default();
        assert!(text.contains("Replace the background with: a rainy Tokyo street."));
        assert!(text.contains("Aspect ratio: 9:16."));
    }

    #[test]
    fn background_with_reference_points_at_reference_environment() {
        let parts = compose_background_change(
            &asset("p"),
            Some(&asset("detail")),
            Some(&asset("beach")),
            "ignored prompt",
            AspectRatio::PORTRAIT,
        );
        assert_eq!(
            roles(&parts),
            vec![
                Some(ImageRole::Subject),
                Some(ImageRole::GarmentDetail),
                Some(ImageRole::CustomBackground),
                None,
            ]
        );
        let text = parts.last().and_then(Part::text).unwrap_or_default();
        assert!(text.contains("the reference environment"));
        assert!(!text.contains("ignored prompt"));
    }

    #[test]
    fn outfit_analysis_appends_instruction_last() {
        let parts = compose_outfit_analysis(&asset("look"), None);
        assert_eq!(roles(&parts), vec![Some(ImageRole::Subject), None]);
        assert_eq!(parts[1].text(), Some(OUTFIT_ANALYSIS_INSTRUCTION));
    }

    #[test]
    fn text_only_prompt_defaults_subject() {
        assert!(compose_text_only_try_on("").contains("wearing this garment."));
        assert!(compose_text_only_try_on("a red trench coat").contains("wearing a red trench coat."));
    }

    #[test]
    fn prompt_list_instruction_names_count() {
        assert_eq!(
            prompt_list_instruction(5),
            "Generate 5 video motion prompts for this outfit. Return JSON { \"prompts\": [] }."
        );
    }
}
