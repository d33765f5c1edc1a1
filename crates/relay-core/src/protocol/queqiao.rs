//! Built-in templates for the QueQiao game-server plugin API.
//!
//! | Kind                 | API                  | Parameters                                     |
//! |----------------------|----------------------|------------------------------------------------|
//! | `mc.broadcast`       | `broadcast`          | `group`, `sender`, `content`                   |
//! | `mc.private_message` | `send_private_msg`   | `uuid`, `nickname`, `sender`, `content`        |
//! | `mc.title`           | `send_title`         | `title`, `subtitle`, `fade_in`, `stay`, `fade_out` |
//! | `mc.actionbar`       | `send_actionbar`     | `content`                                      |
//! | `mc.rcon`            | `send_rcon_command`  | `command`                                      |
//!
//! Message bodies are Minecraft text components (`{"text", "color"}` lists).

use serde_json::{json, Value};

use super::envelope::WireShape;
use super::template::{ProtocolError, ProtocolTemplate, TemplateRegistry};

pub const BROADCAST: &str = "mc.broadcast";
pub const PRIVATE_MESSAGE: &str = "mc.private_message";
pub const TITLE: &str = "mc.title";
pub const ACTIONBAR: &str = "mc.actionbar";
pub const RCON: &str = "mc.rcon";

/// `(kind, api, data skeleton)` for every built-in template.
fn definitions() -> Vec<(&'static str, &'static str, Value)> {
    vec![
        (
            BROADCAST,
            "broadcast",
            json!({
                "message": [
                    { "text": "[{group}]", "color": "aqua" },
                    { "text": " {sender}", "color": "green" },
                    { "text": " :", "color": "white" },
                    { "text": " {content}", "color": "white" }
                ]
            }),
        ),
        (
            PRIVATE_MESSAGE,
            "send_private_msg",
            json!({
                "uuid": "{uuid}",
                "nickname": "{nickname}",
                "message": [
                    { "text": "[私聊]", "color": "aqua" },
                    { "text": " {sender}", "color": "green" },
                    { "text": "说:", "color": "white" },
                    { "text": " {content}", "color": "white" }
                ]
            }),
        ),
        (
            TITLE,
            "send_title",
            json!({
                "title": { "text": "{title}", "color": "aqua" },
                "subtitle": { "text": "{subtitle}" },
                "fade_in": "{fade_in}",
                "stay": "{stay}",
                "fade_out": "{fade_out}"
            }),
        ),
        (
            ACTIONBAR,
            "send_actionbar",
            json!({
                "message": [
                    { "text": "{content}", "color": "aqua" }
                ]
            }),
        ),
        (
            RCON,
            "send_rcon_command",
            json!({ "command": "{command}" }),
        ),
    ]
}

/// Compiles the built-in templates.
pub fn builtin_templates() -> Result<Vec<ProtocolTemplate>, ProtocolError> {
    definitions()
        .into_iter()
        .map(|(kind, api, data)| ProtocolTemplate::new(kind, api, &data))
        .collect()
}

/// A registry pre-loaded with the built-in templates and the QueQiao wire shape.
pub fn registry(echo_enabled: bool) -> Result<TemplateRegistry, ProtocolError> {
    let mut registry = TemplateRegistry::new(WireShape::QUEQIAO, echo_enabled);
    for template in builtin_templates()? {
        registry.insert(template);
    }
    Ok(registry)
}
