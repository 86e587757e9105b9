//! HTML rendering. Templates ship inside the binary; pages are assembled from the
//! shared `header`/`footer` partials plus the generic `form` and `table` partials.

use handlebars::{Handlebars, RenderError, TemplateError};
use serde_json::Value;

pub const LOGIN: &str = "login";
pub const FORM_PAGE: &str = "form_page";
pub const TABLE_PAGE: &str = "table_page";
pub const NETWORK_DETAIL: &str = "network_detail";
pub const ERROR: &str = "error";

const PARTIALS: &[(&str, &str)] = &[
    ("header", include_str!("../templates/header.hbs")),
    ("footer", include_str!("../templates/footer.hbs")),
    ("messages", include_str!("../templates/messages.hbs")),
    ("form", include_str!("../templates/form.hbs")),
    ("table", include_str!("../templates/table.hbs")),
];

const PAGES: &[(&str, &str)] = &[
    (LOGIN, include_str!("../templates/login.hbs")),
    (FORM_PAGE, include_str!("../templates/form_page.hbs")),
    (TABLE_PAGE, include_str!("../templates/table_page.hbs")),
    (NETWORK_DETAIL, include_str!("../templates/network_detail.hbs")),
    (ERROR, include_str!("../templates/error.hbs")),
];

pub struct Templates {
    hb: Handlebars<'static>,
}

impl Templates {
    pub fn new() -> Result<Self, TemplateError> {
        let mut hb = Handlebars::new();
        for (name, src) in PARTIALS {
            hb.register_partial(name, *src)?;
        }
        for (name, src) in PAGES {
            hb.register_template_string(name, *src)?;
        }
        Ok(Self { hb })
    }

    pub fn render(&self, name: &str, ctx: &Value) -> Result<String, RenderError> {
        self.hb.render(name, ctx)
    }

    pub fn has_template(&self, name: &str) -> bool {
        self.hb.has_template(name)
    }
}
