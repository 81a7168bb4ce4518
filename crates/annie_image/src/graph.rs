//! Text-to-image node graph in the server's flat `id -> node` format.

use annie_core::ComfyNodeConfig;
use rand::Rng;
use serde::Serialize;
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;

pub const FALLBACK_NEGATIVE_PROMPT: &str = "low quality, bad anatomy, nsfw, ugly";
pub const FILENAME_PREFIX: &str = "Annie_Gen";
const MAX_SEED: u64 = 1_000_000_000;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Node {
    pub class_type: String,
    pub inputs: Map<String, Value>,
}

impl Node {
    fn new(class_type: &str, inputs: Value) -> Self {
        let inputs = match inputs {
            Value::Object(m) => m,
            _ => Map::new(),
        };
        Self {
            class_type: class_type.to_string(),
            inputs,
        }
    }
}

pub type Workflow = BTreeMap<String, Node>;

/// `[node_id, output_index]` link.
fn link(node: &str, output: u32) -> Value {
    json!([node, output])
}

fn lora_enabled(name: &str) -> bool {
    !name.is_empty() && name != "None"
}

pub fn positive_prompt(prompt: &str, appearance: &str, cfg: &ComfyNodeConfig) -> String {
    let global = cfg
        .global_positive_prompt
        .as_deref()
        .filter(|g| !g.is_empty())
        .map(|g| format!("{}, ", g))
        .unwrap_or_default();
    format!("{}{}, {}", global, prompt, appearance)
}

pub fn negative_prompt(cfg: &ComfyNodeConfig) -> &str {
    if cfg.default_negative_prompt.is_empty() {
        FALLBACK_NEGATIVE_PROMPT
    } else {
        &cfg.default_negative_prompt
    }
}

pub fn random_seed() -> u64 {
    rand::thread_rng().gen_range(0..MAX_SEED)
}

/// Checkpoint, up to two chained LoRAs, prompt encoders, sampler, decoder
/// and saver.
pub fn build_workflow(prompt: &str, appearance: &str, cfg: &ComfyNodeConfig, seed: u64) -> Workflow {
    let mut wf = Workflow::new();
    let mut model = link("4", 0);
    let mut clip = link("4", 1);

    wf.insert(
        "4".into(),
        Node::new("CheckpointLoaderSimple", json!({"ckpt_name": cfg.checkpoint})),
    );

    for (id, name, strength) in [
        ("10", &cfg.lora1, cfg.lora1_strength),
        ("11", &cfg.lora2, cfg.lora2_strength),
    ] {
        if !lora_enabled(name) {
            continue;
        }
        wf.insert(
            id.into(),
            Node::new(
                "LoraLoader",
                json!({
                    "lora_name": name,
                    "strength_model": strength,
                    "strength_clip": 1,
                    "model": model,
                    "clip": clip,
                }),
            ),
        );
        model = link(id, 0);
        clip = link(id, 1);
    }

    wf.insert(
        "6".into(),
        Node::new(
            "CLIPTextEncode",
            json!({"clip": clip, "text": positive_prompt(prompt, appearance, cfg)}),
        ),
    );
    wf.insert(
        "7".into(),
        Node::new(
            "CLIPTextEncode",
            json!({"clip": clip, "text": negative_prompt(cfg)}),
        ),
    );
    wf.insert(
        "5".into(),
        Node::new(
            "EmptyLatentImage",
            json!({"batch_size": 1, "height": cfg.height, "width": cfg.width}),
        ),
    );
    wf.insert(
        "3".into(),
        Node::new(
            "KSampler",
            json!({
                "cfg": cfg.cfg,
                "denoise": 1,
                "model": model,
                "latent_image": link("5", 0),
                "negative": link("7", 0),
                "positive": link("6", 0),
                "sampler_name": cfg.sampler,
                "scheduler": cfg.scheduler,
                "seed": seed,
                "steps": cfg.steps,
            }),
        ),
    );
    wf.insert(
        "8".into(),
        Node::new(
            "VAEDecode",
            json!({"samples": link("3", 0), "vae": link("4", 2)}),
        ),
    );
    wf.insert(
        "9".into(),
        Node::new(
            "SaveImage",
            json!({"filename_prefix": FILENAME_PREFIX, "images": link("8", 0)}),
        ),
    );
    wf
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg() -> ComfyNodeConfig {
        ComfyNodeConfig::default()
    }

    #[test]
    fn test_default_graph_has_no_loras() {
        let wf = build_workflow("a cat", "red hair", &cfg(), 42);
        let ids: Vec<&str> = wf.keys().map(String::as_str).collect();
        assert_eq!(ids, vec!["3", "4", "5", "6", "7", "8", "9"]);
        assert_eq!(wf["3"].inputs["model"], json!(["4", 0]));
        assert_eq!(wf["6"].inputs["clip"], json!(["4", 1]));
        assert_eq!(wf["3"].inputs["seed"], 42);
        assert_eq!(wf["9"].inputs["filename_prefix"], "Annie_Gen");
    }

    #[test]
    fn test_lora_chain_rewires_pointers() {
        let mut c = cfg();
        c.lora1 = "detail.safetensors".into();
        c.lora2 = "style.safetensors".into();
        let wf = build_workflow("p", "", &c, 1);
        assert_eq!(wf["10"].inputs["model"], json!(["4", 0]));
        assert_eq!(wf["11"].inputs["model"], json!(["10", 0]));
        assert_eq!(wf["11"].inputs["clip"], json!(["10", 1]));
        assert_eq!(wf["11"].inputs["strength_clip"], 1);
        assert_eq!(wf["3"].inputs["model"], json!(["11", 0]));
        assert_eq!(wf["7"].inputs["clip"], json!(["11", 1]));
    }

    #[test]
    fn test_second_lora_alone() {
        let mut c = cfg();
        c.lora2 = "style.safetensors".into();
        let wf = build_workflow("p", "", &c, 1);
        assert!(!wf.contains_key("10"));
        assert_eq!(wf["11"].inputs["model"], json!(["4", 0]));
        assert_eq!(wf["6"].inputs["clip"], json!(["11", 1]));
    }

    #[test]
    fn test_prompts() {
        let mut c = cfg();
        c.global_positive_prompt = Some("masterpiece".into());
        assert_eq!(positive_prompt("a cat", "red hair", &c), "masterpiece, a cat, red hair");
        c.global_positive_prompt = None;
        assert_eq!(positive_prompt("a cat", "", &c), "a cat, ");
        c.default_negative_prompt = String::new();
        assert_eq!(negative_prompt(&c), FALLBACK_NEGATIVE_PROMPT);
    }

    #[test]
    fn test_seed_range() {
        for _ in 0..100 {
            assert!(random_seed() < MAX_SEED);
        }
    }
}
