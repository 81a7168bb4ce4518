//! Canned canvas and prompt settings.

use annie_core::ComfyNodeConfig;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct WorkflowPreset {
    pub id: &'static str,
    pub label: &'static str,
    pub width: u32,
    pub height: u32,
    pub steps: u32,
    pub cfg: f64,
    pub sampler: &'static str,
}

pub const WORKFLOW_PRESETS: [WorkflowPreset; 5] = [
    WorkflowPreset {
        id: "sd15-portrait",
        label: "SD1.5 标准 (512x768)",
        width: 512,
        height: 768,
        steps: 20,
        cfg: 7.0,
        sampler: "euler_ancestral",
    },
    WorkflowPreset {
        id: "sd15-landscape",
        label: "SD1.5 宽画幅 (768x512)",
        width: 768,
        height: 512,
        steps: 20,
        cfg: 7.0,
        sampler: "euler_ancestral",
    },
    WorkflowPreset {
        id: "sdxl-portrait",
        label: "SDXL / Pony 竖屏 (832x1216)",
        width: 832,
        height: 1216,
        steps: 25,
        cfg: 7.0,
        sampler: "euler_ancestral",
    },
    WorkflowPreset {
        id: "sdxl-square",
        label: "SDXL / Pony 方形 (1024x1024)",
        width: 1024,
        height: 1024,
        steps: 28,
        cfg: 7.0,
        sampler: "dpmpp_2m",
    },
    WorkflowPreset {
        id: "sdxl-landscape",
        label: "SDXL / Pony 横屏 (1216x832)",
        width: 1216,
        height: 832,
        steps: 25,
        cfg: 7.0,
        sampler: "euler_ancestral",
    },
];

impl WorkflowPreset {
    /// Overwrite canvas size, steps, cfg and sampler. Other fields stay.
    pub fn apply(&self, cfg: &mut ComfyNodeConfig) {
        cfg.width = self.width;
        cfg.height = self.height;
        cfg.steps = self.steps;
        cfg.cfg = self.cfg;
        if !self.sampler.is_empty() {
            cfg.sampler = self.sampler.to_string();
        }
    }

    /// Look up by id or by label.
    pub fn find(key: &str) -> Option<&'static WorkflowPreset> {
        WORKFLOW_PRESETS.iter().find(|p| p.id == key || p.label == key)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PromptPreset {
    pub id: &'static str,
    pub label: &'static str,
    pub value: &'static str,
}

pub const POSITIVE_PROMPT_PRESETS: [PromptPreset; 4] = [
    PromptPreset {
        id: "general",
        label: "通用高质量 (General High Quality)",
        value: "masterpiece, best quality, very aesthetic, highly detailed",
    },
    PromptPreset {
        id: "anime",
        label: "动漫风格 (Anime Style)",
        value: "anime style, key visual, vibrant colors, clean lines, high quality",
    },
    PromptPreset {
        id: "photo",
        label: "写实照片 (Realistic Photo)",
        value: "photorealistic, 8k, raw photo, dslr, soft lighting, film grain",
    },
    PromptPreset {
        id: "pony",
        label: "Pony V6 专用 (Score 9)",
        value: "score_9, score_8_up, score_7_up, source_anime, simple background",
    },
];

impl PromptPreset {
    pub fn find(key: &str) -> Option<&'static PromptPreset> {
        POSITIVE_PROMPT_PRESETS
            .iter()
            .find(|p| p.id == key || p.label == key)
    }

    pub fn apply(&self, cfg: &mut ComfyNodeConfig) {
        cfg.global_positive_prompt = Some(self.value.to_string());
    }
}
