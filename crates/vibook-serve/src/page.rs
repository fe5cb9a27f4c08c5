use std::path::Path;

use minijinja::{context, Environment};

use crate::assets::EXAMPLE_ASSETS;

const INDEX: &str = "index.html";
const BUILTIN_INDEX: &str = include_str!("../templates/index.html");
const TITLE: &str = "Vibook VQA";

/// Renders the html page.
pub struct PageRenderer {
    env: Environment<'static>,
}

impl PageRenderer {
    /// Create a renderer with the built-in page, or `<templates_dir>/index.html` when it exists.
    pub fn new(templates_dir: Option<&Path>) -> Result<Self, Box<dyn std::error::Error>> {
        let source = match templates_dir.map(|dir| dir.join(INDEX)) {
            Some(path) if path.is_file() => {
                log::info!("Using page template {}", path.display());
                std::fs::read_to_string(path)?
            }
            _ => BUILTIN_INDEX.to_string(),
        };

        let mut env = Environment::new();
        env.add_template_owned(INDEX, source)?;

        Ok(Self { env })
    }

    pub fn render_index(&self, model_ready: bool) -> Result<String, minijinja::Error> {
        self.env.get_template(INDEX)?.render(context! {
            title => TITLE,
            model_ready => model_ready,
            examples => EXAMPLE_ASSETS,
        })
    }
}
