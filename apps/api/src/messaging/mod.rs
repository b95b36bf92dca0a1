// WhatsApp messaging: outbound sends through the Evolution API gateway, the
// contact history log and routing of inbound webhook deliveries.

pub mod handlers;
pub mod history;
pub mod inbound;
pub mod whatsapp;
