//! CSS selectors for the chat.deepseek.com UI.
//!
//! The site ships hashed class names, so these are brittle by nature. Keeping
//! them in one table keeps updates cheap when the frontend is redeployed.

pub const CHAT_URL: &str = "https://chat.deepseek.com/";

// Login form
pub const EMAIL_INPUT: &str = r#"input[type="text"]"#;
pub const PASSWORD_INPUT: &str = r#"input[type="password"]"#;
pub const CONFIRM_CHECKBOX: &str =
    r#"div[class="ds-checkbox ds-checkbox--none ds-checkbox--bordered"]"#;
pub const LOGIN_BUTTON: &str = r#"div[role="button"]"#;

// Composer
pub const MESSAGE_BOX: &str = r#"textarea[class="c92459f0"]"#;
/// First child toggles DeepThink (R1), second child toggles Search.
pub const SEND_OPTIONS_PARENT: &str = r#"div[class="ec4f5d61"]"#;
pub const SEND_BUTTON: &str = r#"div[class="f6d670"]"#;
pub const NEW_CHAT_BUTTON: &str = r#"div[class="e214291b"]"#;

// Replies
/// Copy | regenerate | like | dislike, in child order.
pub const RESPONSE_TOOLBAR: &str = r#"div[class="ds-flex abe97156"]"#;
pub const RESPONSE_GENERATING: &str = r#"div[class="f9bf7997 d7dc56a8"]"#;
pub const RESPONSE_GENERATED: &str = r#"div[class="f9bf7997 d7dc56a8 c05b5566"]"#;
pub const REGEN_LOADING_ICON: &str = r#"div[class="ds-loading b4e4476b"]"#;
pub const DEEPTHINK_CONTENT: &str = r#"div[class="e1675d8b"]"#;
pub const SEARCH_RESULTS_PANEL: &str = r#"div[class="fe369d61 f529c936"]"#;

// scraper-side (class lists, not CSS attribute selectors)
pub const MARKDOWN_BLOCK: &str = "div.ds-markdown.ds-markdown--block";
