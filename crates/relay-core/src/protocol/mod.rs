//! Protocol module containing the outbound envelope and the template engine.

pub mod envelope;
pub mod queqiao;
pub mod template;

pub use envelope::{extract_echo, strip_echo, OutboundMessage, WireShape, ECHO_FIELD};
pub use template::{
    Params, ProtocolError, ProtocolTemplate, TemplateDefinition, TemplateNode, TemplateRegistry,
    TemplateString,
};
