use crate::models::{Scene, StoryConfig, WriterPersona};

pub fn persona_prompt(persona: WriterPersona, style: &str) -> String {
    match persona {
        WriterPersona::InnovationAndVersatility => format!(
            "You are a world-class, highly creative writer able to produce innovative work in any literary style. \
            Your writing must be original, engaging and inspiring, pushing past convention. \
            Aim to surprise and stir the imagination. Write in the style of {style}."
        ),
        WriterPersona::DepthAndUniqueness => format!(
            "You are a literary genius and an unrivalled writer. Your mission is to create hypnotic, intriguing plots \
            that stand out for their depth, originality and emotional resonance. \
            Every piece should carry the seed of a new, undiscovered story ready to unfold. Write in the style of {style}."
        ),
        WriterPersona::VisionAndDynamism => format!(
            "You are a visionary, globally acclaimed master of the pen who specialises in dynamic, gripping plots. \
            Your task is to turn ideas into sparkling narratives that seize attention at once and leave a lasting impression. \
            Focus on innovation and the force of the message. Write in the style of {style}."
        ),
        WriterPersona::Universality => format!(
            "You are a world-famous, immensely creative writer. You produce innovative, gripping plots in the style of {style} \
            that inspire and surprise with their originality."
        ),
    }
}

pub fn outline_prompt(topic: &str) -> String {
    format!("Generate a title and a plot outline for a story about: {topic}")
}

pub fn scenes_system_prompt(style: &str) -> String {
    format!("You are a screenwriter. Your task is to break a story down into its key scenes. Keep the style of {style}.")
}

pub fn scenes_prompt(title: &str, summary: &str) -> String {
    format!(
        "Based on the title and outline below, create a list of 5-7 key scenes that build the narrative.\n\nTitle: {title}\n\nOutline: {summary}"
    )
}

pub const SCENE_MARKER: &str = "Scene:";

pub fn story_prompt(title: &str, scenes: &[Scene]) -> String {
    let scene_blocks: Vec<String> = scenes
        .iter()
        .map(|s| format!("**{SCENE_MARKER} {}**\n{}", s.title, s.description))
        .collect();
    format!(
        "Write the complete story, without a title, following the guidelines below.\n\nTitle: {title}\n\nScenes:\n{}",
        scene_blocks.join("\n")
    )
}

pub fn illustration_prompt(config: &StoryConfig, scene: &Scene) -> String {
    format!(
        "Create a digital illustration in the style of {}, capturing the atmosphere and mood: {}. Scene: {}: {}",
        config.illustration_style, config.illustration_mood, scene.title, scene.description
    )
}

/// Drops scene headers the model sometimes echoes back from the prompt.
pub fn strip_scene_markup(text: &str) -> String {
    let kept: Vec<&str> = text
        .lines()
        .filter(|line| {
            let bare = line.trim().trim_matches(|c| c == '*' || c == '#' || c == '_').trim();
            !bare.starts_with(SCENE_MARKER)
        })
        .collect();
    kept.join("\n").trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn persona_prompts_embed_the_style() {
        for persona in WriterPersona::ALL {
            assert!(persona_prompt(persona, "Fantasy").contains("Fantasy"), "{persona:?}");
        }
    }

    #[test]
    fn story_prompt_lists_every_scene_in_order() {
        let scenes = vec![
            Scene { title: "Dusk".into(), description: "The lamp is lit.".into() },
            Scene { title: "Storm".into(), description: "Waves hit the rocks.".into() },
        ];
        let prompt = story_prompt("Last Light", &scenes);
        let dusk = prompt.find("**Scene: Dusk**").unwrap();
        let storm = prompt.find("**Scene: Storm**").unwrap();
        assert!(dusk < storm);
        assert!(prompt.contains("Title: Last Light"));
    }

    #[test]
    fn illustration_prompt_uses_global_style_and_mood() {
        let config = StoryConfig { illustration_style: "watercolor".into(), illustration_mood: "nostalgic".into(), ..StoryConfig::default() };
        let scene = Scene { title: "Dusk".into(), description: "The lamp is lit.".into() };
        let prompt = illustration_prompt(&config, &scene);
        assert!(prompt.contains("watercolor"));
        assert!(prompt.contains("nostalgic"));
        assert!(prompt.ends_with("Dusk: The lamp is lit."));
    }

    #[test]
    fn scene_markup_is_stripped_from_prose() {
        let raw = "**Scene: Dusk**\nThe keeper climbed the stairs.\n\n## Scene: Storm\nRain fell.\nThe scene was quiet.";
        assert_eq!(strip_scene_markup(raw), "The keeper climbed the stairs.\n\nRain fell.\nThe scene was quiet.");
    }
}
