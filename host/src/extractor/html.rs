//! HTML value selection with XPath.
//!
//! The parser is strict: the attested document must be well-formed markup.
//! Accepting tag-soup would make the sealed selector ambiguous.

use notary_lib::proof_data::HtmlResultType;
use sxd_document::dom::{ChildOfElement, Element};
use sxd_xpath::nodeset::Node;
use sxd_xpath::{Context, Factory, Value};

use crate::error::HostError;

/// Evaluate `selector` against an HTML body. `Element` emits the serialized
/// element including tags, `Value` emits the inner text.
pub fn select_html(
    body: &[u8],
    selector: &str,
    result_type: Option<HtmlResultType>,
) -> Result<String, HostError> {
    let text = std::str::from_utf8(body)
        .map_err(|e| HostError::DecodingHtmlResponse(e.to_string()))?;
    let package = sxd_document::parser::parse(text)
        .map_err(|e| HostError::DecodingHtmlResponse(format!("{e:?}")))?;
    let document = package.as_document();

    let xpath = Factory::new()
        .build(selector)
        .map_err(|e| HostError::ValidationFailed {
            field: "selector".to_string(),
            reason: format!("invalid XPath: {e}"),
        })?
        .ok_or_else(|| HostError::ValidationFailed {
            field: "selector".to_string(),
            reason: "empty XPath".to_string(),
        })?;

    let context = Context::new();
    let value = xpath
        .evaluate(&context, document.root())
        .map_err(|_| HostError::SelectorNotFound(selector.to_string()))?;

    let text = match value {
        Value::Nodeset(nodeset) => {
            let node = nodeset
                .document_order_first()
                .ok_or_else(|| HostError::SelectorNotFound(selector.to_string()))?;
            render_node(&node, result_type.unwrap_or(HtmlResultType::Value))
        }
        Value::String(s) => s,
        Value::Number(n) => format_xpath_number(n),
        Value::Boolean(b) => b.to_string(),
    };
    if text.is_empty() {
        return Err(HostError::EmptyAttestationData);
    }
    Ok(text)
}

fn render_node(node: &Node<'_>, result_type: HtmlResultType) -> String {
    match node {
        Node::Element(element) => match result_type {
            HtmlResultType::Element => {
                let mut out = String::new();
                write_element(&mut out, *element);
                out
            }
            HtmlResultType::Value => element_text(*element),
        },
        Node::Text(text) => text.text().to_string(),
        Node::Attribute(attribute) => attribute.value().to_string(),
        _ => String::new(),
    }
}

fn write_element(out: &mut String, element: Element<'_>) {
    out.push('<');
    out.push_str(element.name().local_part());
    for attribute in element.attributes() {
        out.push(' ');
        out.push_str(attribute.name().local_part());
        out.push_str("=\"");
        out.push_str(attribute.value());
        out.push('"');
    }
    out.push('>');
    for child in element.children() {
        match child {
            ChildOfElement::Element(child) => write_element(out, child),
            ChildOfElement::Text(text) => out.push_str(text.text()),
            _ => {}
        }
    }
    out.push_str("</");
    out.push_str(element.name().local_part());
    out.push('>');
}

fn element_text(element: Element<'_>) -> String {
    let mut out = String::new();
    collect_text(&mut out, element);
    out
}

fn collect_text(out: &mut String, element: Element<'_>) {
    for child in element.children() {
        match child {
            ChildOfElement::Element(child) => collect_text(out, child),
            ChildOfElement::Text(text) => out.push_str(text.text()),
            _ => {}
        }
    }
}

fn format_xpath_number(n: f64) -> String {
    if n.fract() == 0.0 && n.is_finite() {
        format!("{}", n as i64)
    } else {
        n.to_string()
    }
}
