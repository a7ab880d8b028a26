//! The engine's single stylesheet

use crate::config::Palette;
use crate::dom::{Dom, DomError};

use super::store::ANNOTATION_CLASS;

/// Id of the owned `<style>` element
pub const STYLE_ELEMENT_ID: &str = "lifeprice-style";

/// CSS for annotation elements in the given colours
pub fn stylesheet_css(palette: &Palette) -> String {
    format!(
        ".{class} {{ color: {text}; background-color: {bg}; border: 1px solid {border}; \
         border-radius: 3px; padding: 0 4px; margin-left: 5px; font-size: 0.9em; \
         white-space: nowrap; }}",
        class = ANNOTATION_CLASS,
        text = palette.text,
        bg = palette.background,
        border = palette.border,
    )
}

/// Create the stylesheet, or rewrite it in place if it already exists
pub fn install_stylesheet<D: Dom>(dom: &mut D, palette: &Palette) -> Result<D::Node, DomError> {
    let css = stylesheet_css(palette);

    if let Some(existing) = dom.element_by_id(STYLE_ELEMENT_ID) {
        if dom.text_content(&existing) != css {
            dom.set_text(&existing, &css)?;
        }
        return Ok(existing);
    }

    let head = dom
        .head()
        .or_else(|| dom.body())
        .ok_or_else(|| DomError::Detached("document has no head or body".to_string()))?;
    let style = dom.create_element("style")?;
    dom.set_attribute(&style, "id", STYLE_ELEMENT_ID)?;
    dom.set_text(&style, &css)?;
    dom.append_child(&head, &style)?;
    Ok(style)
}
