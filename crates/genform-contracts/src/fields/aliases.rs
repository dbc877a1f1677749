/// UI field name -> backend field name.
const FIELD_ALIASES: &[(&str, &str)] = &[
    ("quantity", "num_images"),
    ("num_outputs", "num_images"),
    ("output_quality", "quality"),
    ("ratio", "aspect_ratio"),
    ("negative", "negative_prompt"),
    ("start_image", "image_url"),
    ("original_image", "image_url"),
    ("end_image", "end_image_url"),
    ("tail_image_url", "end_image_url"),
    ("style_prompt", "prompt"),
    ("video_length", "duration"),
    ("effect", "template"),
];

pub fn canonical_field_name(name: &str) -> &str {
    FIELD_ALIASES
        .iter()
        .find(|(alias, _)| *alias == name)
        .map(|(_, canonical)| *canonical)
        .unwrap_or(name)
}

pub fn is_alias(name: &str) -> bool {
    FIELD_ALIASES.iter().any(|(alias, _)| *alias == name)
}
