//! Shared UI icons.

use console::Emoji;

// Status indicators
pub static CHECK: Emoji<'_, '_> = Emoji("✅ ", "[OK]");
pub static CROSS: Emoji<'_, '_> = Emoji("❌ ", "[ERR]");
pub static WARN: Emoji<'_, '_> = Emoji("⚠️  ", "[WARN]");
pub static SPARKLE: Emoji<'_, '_> = Emoji("✨ ", "*");

// Lifecycle indicators
pub static CLOUD: Emoji<'_, '_> = Emoji("☁️  ", "");
pub static TRASH: Emoji<'_, '_> = Emoji("🗑️  ", "-");
pub static LINK: Emoji<'_, '_> = Emoji("🔗 ", "->");
