//! VNode renderer.
//!
//! Walks an evaluated element tree into an HTML string. Text and attribute values are escaped;
//! `dangerouslySetInnerHTML.__html` is the only way raw markup reaches the output.

use crate::error::BuildResult;
use crate::vnode::{Value, FRAGMENT_KEY};
use indexmap::IndexMap;
use lazy_static::lazy_static;
use std::collections::HashSet;

lazy_static! {
    pub static ref SELF_CLOSING_TAGS: HashSet<&'static str> = [
        "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param",
        "source", "track", "wbr",
    ]
    .into_iter()
    .collect();
}

pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#039;"),
            _ => out.push(c),
        }
    }
    out
}

pub fn camel_to_kebab(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    for c in name.chars() {
        if c.is_ascii_uppercase() {
            out.push('-');
            out.push(c.to_ascii_lowercase());
        } else {
            out.push(c);
        }
    }
    out
}

fn style_to_string(style: &Value) -> String {
    match style {
        Value::Object(entries) => entries
            .borrow()
            .iter()
            .map(|(k, v)| format!("{}: {}", camel_to_kebab(k), v.to_js_string()))
            .collect::<Vec<_>>()
            .join("; "),
        other => other.to_js_string(),
    }
}

fn render_attributes(props: &IndexMap<String, Value>) -> String {
    let mut attributes = Vec::new();
    for (key, value) in props {
        if key == "children" || key == "dangerouslySetInnerHTML" {
            continue;
        }
        match value {
            Value::Undefined | Value::Null | Value::Function(_) => continue,
            Value::Bool(true) => {
                let name = if key == "className" { "class" } else { key.as_str() };
                attributes.push(name.to_string());
                continue;
            }
            Value::Bool(false) => continue,
            _ => {}
        }
        match key.as_str() {
            "className" => attributes.push(format!("class=\"{}\"", escape_html(&value.to_js_string()))),
            "style" => attributes.push(format!("style=\"{}\"", escape_html(&style_to_string(value)))),
            _ => attributes.push(format!("{}=\"{}\"", key, escape_html(&value.to_js_string()))),
        }
    }
    if attributes.is_empty() {
        String::new()
    } else {
        format!(" {}", attributes.join(" "))
    }
}

fn props_of(node: &Value) -> IndexMap<String, Value> {
    match node.get("props") {
        Some(Value::Object(props)) => props.borrow().clone(),
        _ => IndexMap::new(),
    }
}

fn children_of(node: &Value) -> Vec<Value> {
    match node.get("children") {
        Some(Value::Array(items)) => items.borrow().clone(),
        _ => Vec::new(),
    }
}

fn inner_html(props: &IndexMap<String, Value>) -> Option<String> {
    let html = props.get("dangerouslySetInnerHTML")?.get("__html")?;
    html.is_truthy().then(|| html.to_js_string())
}

pub fn render(vnode: &Value) -> BuildResult<String> {
    let mut out = String::new();
    render_into(vnode, &mut out)?;
    Ok(out)
}

fn render_into(vnode: &Value, out: &mut String) -> BuildResult<()> {
    match vnode {
        Value::Undefined | Value::Null | Value::Bool(_) => Ok(()),
        Value::String(s) => {
            out.push_str(&escape_html(s));
            Ok(())
        }
        Value::Number(_) => {
            out.push_str(&escape_html(&vnode.to_js_string()));
            Ok(())
        }
        Value::Array(items) => {
            let items = items.borrow().clone();
            for item in &items {
                render_into(item, out)?;
            }
            Ok(())
        }
        Value::Object(_) if vnode.is_vnode() => render_node(vnode, out),
        _ => Ok(()),
    }
}

fn render_node(node: &Value, out: &mut String) -> BuildResult<()> {
    let tag = node.get("tag").unwrap_or_default();
    let props = props_of(node);
    let children = children_of(node);

    match &tag {
        Value::Function(component) => {
            let mut component_props = props;
            if !children.is_empty() {
                component_props.insert("children".to_string(), Value::array(children));
            }
            let result = component.call(&Value::Undefined, vec![Value::object(component_props)])?;
            render_into(&result, out)
        }
        Value::Symbol(key) if &**key == FRAGMENT_KEY => {
            for child in &children {
                render_into(child, out)?;
            }
            Ok(())
        }
        Value::String(name) => {
            let attrs = render_attributes(&props);
            if SELF_CLOSING_TAGS.contains(&**name) {
                out.push_str(&format!("<{}{} />", name, attrs));
                return Ok(());
            }
            out.push_str(&format!("<{}{}>", name, attrs));
            match inner_html(&props) {
                Some(html) => out.push_str(&html),
                None => {
                    for child in &children {
                        render_into(child, out)?;
                    }
                }
            }
            out.push_str(&format!("</{}>", name));
            Ok(())
        }
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vnode::{create_element, JsResult, NativeFunction, Thrown};

    fn props(entries: Vec<(&str, Value)>) -> Value {
        Value::object(entries.into_iter().map(|(k, v)| (k.to_string(), v)).collect())
    }

    fn el(tag: &str, p: Value, children: Vec<Value>) -> Value {
        let mut args = vec![Value::string(tag), p];
        args.extend(children);
        create_element(&args)
    }

    #[test]
    fn test_primitives() {
        assert_eq!(render(&Value::Null).unwrap(), "");
        assert_eq!(render(&Value::Undefined).unwrap(), "");
        assert_eq!(render(&Value::Bool(true)).unwrap(), "");
        assert_eq!(render(&Value::Bool(false)).unwrap(), "");
        assert_eq!(render(&Value::Number(42.0)).unwrap(), "42");
        assert_eq!(render(&Value::string("a & b")).unwrap(), "a &amp; b");
    }

    #[test]
    fn test_self_closing_ignores_children() {
        let img = el("img", props(vec![("src", Value::string("a.png"))]), vec![Value::string("ignored")]);
        assert_eq!(render(&img).unwrap(), "<img src=\"a.png\" />");
    }

    #[test]
    fn test_fragment_has_no_wrapper() {
        let empty = create_element(&[Value::fragment(), Value::Null]);
        assert_eq!(render(&empty).unwrap(), "");
        let full = create_element(&[
            Value::fragment(),
            Value::Null,
            el("b", Value::Null, vec![Value::string("x")]),
            Value::string("y"),
        ]);
        assert_eq!(render(&full).unwrap(), "<b>x</b>y");
    }

    #[test]
    fn test_boolean_attributes() {
        let on = el("input", props(vec![("disabled", Value::Bool(true))]), vec![]);
        assert_eq!(render(&on).unwrap(), "<input disabled />");
        let off = el("input", props(vec![("disabled", Value::Bool(false))]), vec![]);
        assert_eq!(render(&off).unwrap(), "<input />");
    }

    #[test]
    fn test_attribute_and_text_escaping() {
        let node = el(
            "a",
            props(vec![("title", Value::string("\"x\" & 'y' <z>"))]),
            vec![Value::string("<script>")],
        );
        assert_eq!(
            render(&node).unwrap(),
            "<a title=\"&quot;x&quot; &amp; &#039;y&#039; &lt;z&gt;\">&lt;script&gt;</a>"
        );
    }

    #[test]
    fn test_class_name_and_style() {
        let style = props(vec![
            ("backgroundColor", Value::string("red")),
            ("fontSize", Value::string("12px")),
        ]);
        let node = el(
            "div",
            props(vec![("className", Value::string("card")), ("style", style)]),
            vec![],
        );
        assert_eq!(
            render(&node).unwrap(),
            "<div class=\"card\" style=\"background-color: red; font-size: 12px\"></div>"
        );

        let inline = el("p", props(vec![("style", Value::string("color: blue"))]), vec![]);
        assert_eq!(render(&inline).unwrap(), "<p style=\"color: blue\"></p>");
    }

    #[test]
    fn test_null_attributes_are_skipped() {
        let node = el(
            "p",
            props(vec![("id", Value::Null), ("title", Value::Undefined), ("data-n", Value::Number(3.0))]),
            vec![],
        );
        assert_eq!(render(&node).unwrap(), "<p data-n=\"3\"></p>");
    }

    #[test]
    fn test_dangerously_set_inner_html_is_raw() {
        let html = props(vec![("__html", Value::string("<b>raw</b>"))]);
        let node = el(
            "div",
            props(vec![("dangerouslySetInnerHTML", html)]),
            vec![Value::string("dropped")],
        );
        assert_eq!(render(&node).unwrap(), "<div><b>raw</b></div>");

        let empty = props(vec![("__html", Value::string(""))]);
        let fallback = el(
            "div",
            props(vec![("dangerouslySetInnerHTML", empty)]),
            vec![Value::string("kept")],
        );
        assert_eq!(render(&fallback).unwrap(), "<div>kept</div>");
    }

    fn card(_this: &Value, args: &[Value]) -> JsResult<Value> {
        let p = args.first().cloned().unwrap_or_default();
        let title = p.get("title").unwrap_or_default();
        let children = p.get("children").unwrap_or_else(|| Value::array(vec![]));
        Ok(create_element(&[
            Value::string("section"),
            Value::Null,
            create_element(&[Value::string("h2"), Value::Null, title]),
            children,
        ]))
    }

    #[test]
    fn test_component_receives_props_and_children() {
        let node = create_element(&[
            NativeFunction::value("Card", card),
            props(vec![("title", Value::string("Hi"))]),
            Value::string("body"),
        ]);
        assert_eq!(render(&node).unwrap(), "<section><h2>Hi</h2>body</section>");
    }

    #[test]
    fn test_component_without_children_gets_no_children_key() {
        fn probe(_this: &Value, args: &[Value]) -> JsResult<Value> {
            let p = args.first().cloned().unwrap_or_default();
            Ok(Value::string(if p.get("children").is_some() { "yes" } else { "no" }))
        }
        let node = create_element(&[NativeFunction::value("Probe", probe), Value::Null]);
        assert_eq!(render(&node).unwrap(), "no");
    }

    #[test]
    fn test_throwing_component_propagates() {
        fn boom(_this: &Value, _args: &[Value]) -> JsResult<Value> {
            Err(Thrown::error("Error", "boom"))
        }
        let node = create_element(&[NativeFunction::value("Boom", boom), Value::Null]);
        let err = render(&node).unwrap_err();
        assert!(err.to_string().contains("boom"));
    }

    #[test]
    fn test_malformed_shapes_render_empty() {
        let no_tag = props(vec![("props", Value::empty_object())]);
        assert_eq!(render(&no_tag).unwrap(), "");
        let numeric_tag = create_element(&[Value::Number(1.0), Value::Null]);
        assert_eq!(render(&numeric_tag).unwrap(), "");
    }

    #[test]
    fn test_render_is_deterministic() {
        let tree = el(
            "ul",
            Value::Null,
            vec![
                el("li", props(vec![("key", Value::Number(1.0))]), vec![Value::string("a")]),
                el("li", props(vec![("key", Value::Number(2.0))]), vec![Value::string("b")]),
            ],
        );
        assert_eq!(render(&tree).unwrap(), render(&tree).unwrap());
    }
}
