//! HTML reference for a generated [`MetaObject`]

use crate::meta::{MetaMethod, MetaObject, PropertyFlags};

fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '&' => out.push_str("&amp;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}

/// `int Add(int a, int b)`
fn prototype(method: &MetaMethod) -> String {
    let params: Vec<String> = method
        .parameter_types
        .iter()
        .enumerate()
        .map(|(i, ty)| match method.parameter_names.get(i) {
            Some(name) if !name.is_empty() => format!("{ty} {name}"),
            _ => ty.clone(),
        })
        .collect();
    let ret = if method.return_type.is_empty() {
        "void"
    } else {
        method.return_type.as_str()
    };
    format!("{ret} {}({})", method.name(), params.join(", "))
}

fn anchor(signature: &str) -> String {
    signature
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}

fn slot_usage(method: &MetaMethod) -> String {
    let args: Vec<String> = method
        .parameter_names
        .iter()
        .enumerate()
        .map(|(i, name)| {
            if name.is_empty() {
                format!("arg{i}")
            } else {
                name.clone()
            }
        })
        .collect();
    let call = format!(
        "object.dynamic_call(\"{}\", &mut vec![{}])",
        method.signature,
        args.join(", ")
    );
    if method.return_type.is_empty() {
        format!("{call}?;")
    } else {
        format!("let result = {call}?;")
    }
}

fn flag_names(flags: PropertyFlags) -> String {
    let mut names = Vec::new();
    if flags.contains(PropertyFlags::READABLE) {
        names.push("read");
    }
    if flags.contains(PropertyFlags::WRITABLE) {
        names.push("write");
    }
    if flags.contains(PropertyFlags::BINDABLE) {
        names.push("bindable");
    }
    if flags.contains(PropertyFlags::REQUESTING_EDIT) {
        names.push("requests edit");
    }
    if !flags.contains(PropertyFlags::DESIGNABLE) {
        names.push("hidden");
    }
    names.join(", ")
}

/// Render the members of `meta` as an HTML page. `control` is mentioned in
/// the introduction when not empty.
#[must_use]
pub fn render(meta: &MetaObject, control: &str) -> String {
    let class = escape(&meta.class_name);
    let mut out = String::new();
    out.push_str(&format!(
        "<html><head><title>{class} Reference</title></head><body>\n<h1>{class} Reference</h1>\n"
    ));
    if control.is_empty() {
        out.push_str(&format!("<p>The {class} automation object.</p>\n"));
    } else {
        out.push_str(&format!(
            "<p>The {class} automation object, created from <tt>{}</tt>.</p>\n",
            escape(control)
        ));
    }

    if !meta.class_info.is_empty() {
        out.push_str("<h3>Class information</h3>\n<table>\n");
        for (key, value) in &meta.class_info {
            out.push_str(&format!(
                "<tr><td>{}</td><td><tt>{}</tt></td></tr>\n",
                escape(key),
                escape(value)
            ));
        }
        out.push_str("</table>\n");
    }

    let slots: Vec<&MetaMethod> = meta.slots().collect();
    let signals: Vec<&MetaMethod> = meta.signals().collect();

    if !slots.is_empty() {
        out.push_str("<h2>Public Slots:</h2>\n<ul>\n");
        for slot in &slots {
            out.push_str(&format!(
                "<li><a href=\"#{}\">{}</a></li>\n",
                anchor(&slot.signature),
                escape(&prototype(slot))
            ));
        }
        out.push_str("</ul>\n");
    }
    if !signals.is_empty() {
        out.push_str("<h2>Signals:</h2>\n<ul>\n");
        for signal in &signals {
            out.push_str(&format!("<li>{}</li>\n", escape(&prototype(signal))));
        }
        out.push_str("</ul>\n");
    }
    if !meta.properties.is_empty() {
        out.push_str("<h2>Properties:</h2>\n<ul>\n");
        for property in &meta.properties {
            out.push_str(&format!(
                "<li><a href=\"#{}\">{} {}</a> ({})</li>\n",
                anchor(&property.name),
                escape(&property.type_name),
                escape(&property.name),
                flag_names(property.flags)
            ));
        }
        out.push_str("</ul>\n");
    }
    if !meta.enums.is_empty() {
        out.push_str("<h2>Enums:</h2>\n");
        for meta_enum in &meta.enums {
            out.push_str(&format!("<h3>{}</h3>\n<ul>\n", escape(&meta_enum.name)));
            for (key, value) in &meta_enum.keys {
                out.push_str(&format!("<li>{} = {value}</li>\n", escape(key)));
            }
            out.push_str("</ul>\n");
        }
    }

    if !slots.is_empty() {
        out.push_str("<h2>Member Function Documentation</h2>\n");
        for slot in slots.iter().filter(|slot| !slot.cloned) {
            out.push_str(&format!(
                "<h3><a name=\"{}\"></a>{}</h3>\n<pre>{}</pre>\n",
                anchor(&slot.signature),
                escape(&prototype(slot)),
                escape(&slot_usage(slot))
            ));
        }
    }
    if !meta.properties.is_empty() {
        out.push_str("<h2>Property Documentation</h2>\n");
        for property in &meta.properties {
            let name = escape(&property.name);
            out.push_str(&format!(
                "<h3><a name=\"{}\"></a>{} {name}</h3>\n<pre>",
                anchor(&property.name),
                escape(&property.type_name)
            ));
            if property.is_readable() {
                out.push_str(&format!("let value = object.property(\"{name}\")?;\n"));
            }
            if property.is_writable() {
                out.push_str(&format!("object.set_property(\"{name}\", value)?;\n"));
            }
            out.push_str("</pre>\n");
            if let Some(notify) = &property.notify {
                out.push_str(&format!(
                    "<p>Changes are notified through <tt>{}</tt>.</p>\n",
                    escape(notify)
                ));
            }
        }
    }
    out.push_str("</body></html>\n");
    out
}
