use serde_json::Value;
use virtseed_machine::ProvisioningRecord;

/// Namespace of the custom metadata element stored on each domain.
pub const METADATA_URI: &str = "urn:virtseed:metadata:1.0";
pub const METADATA_KEY: &str = "virtseed";

const ROOT_ELEMENT: &str = "virtseed";
const LIST_ITEM_ELEMENT: &str = "item";

/// Snapshot of a record as a single `<virtseed>` element.
///
/// Userdata is left out. `ansible_host` is added so inventory tooling can
/// reach the machine by name.
pub fn metadata_xml(record: &ProvisioningRecord) -> Result<String, serde_json::Error> {
    let mut snapshot = match serde_json::to_value(record)? {
        Value::Object(snapshot) => snapshot,
        other => return Ok(element_to_string(ROOT_ELEMENT, &other)),
    };
    snapshot.insert("ansible_host".to_owned(), Value::String(record.fqdn.clone()));
    Ok(element_to_string(ROOT_ELEMENT, &Value::Object(snapshot)))
}

fn element_to_string(name: &str, value: &Value) -> String {
    let mut out = String::new();
    write_element(&mut out, name, value);
    out
}

fn write_element(out: &mut String, name: &str, value: &Value) {
    match value {
        Value::Null => {
            out.push('<');
            out.push_str(name);
            out.push_str("/>");
        }
        Value::Bool(value) => write_text(out, name, &value.to_string()),
        Value::Number(value) => write_text(out, name, &value.to_string()),
        Value::String(value) => write_text(out, name, value),
        Value::Array(items) => {
            open(out, name);
            for item in items {
                write_element(out, LIST_ITEM_ELEMENT, item);
            }
            close(out, name);
        }
        Value::Object(fields) => {
            open(out, name);
            for (key, value) in fields {
                write_element(out, key, value);
            }
            close(out, name);
        }
    }
}

fn write_text(out: &mut String, name: &str, text: &str) {
    open(out, name);
    escape_into(out, text);
    close(out, name);
}

fn open(out: &mut String, name: &str) {
    out.push('<');
    out.push_str(name);
    out.push('>');
}

fn close(out: &mut String, name: &str) {
    out.push_str("</");
    out.push_str(name);
    out.push('>');
}

fn escape_into(out: &mut String, text: &str) {
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            c => out.push(c),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use virtseed_machine::MachineSettings;

    fn record() -> ProvisioningRecord {
        let settings: MachineSettings = serde_json::from_value(json!({
            "hostname": "web",
            "variant": "debian12",
            "directory": "/vms",
            "backingdisk": "/images/debian.qcow2",
            "ssh_keys": ["ssh-ed25519 AAAA <ops@lab>"],
            "userdata": { "password": "secret" },
            "volumes": [{ "size": 10 }],
        }))
        .unwrap();
        let mut record = ProvisioningRecord::new(settings);
        record.resolve_domain("lab.example");
        record
    }

    #[test]
    fn single_root_without_prolog() {
        let xml = metadata_xml(&record()).unwrap();
        assert!(xml.starts_with("<virtseed><name>default_web</name>"));
        assert!(xml.ends_with("</virtseed>"));
        assert!(!xml.contains("<?xml"));
    }

    #[test]
    fn carries_inventory_fields() {
        let xml = metadata_xml(&record()).unwrap();
        assert!(xml.contains("<fqdn>web.lab.example</fqdn>"));
        assert!(xml.contains("<ansible_host>web.lab.example</ansible_host>"));
        assert!(xml.contains("<ansible_user>sysmaint</ansible_user>"));
        assert!(xml.contains("<cpu>1</cpu><mem>512</mem>"));
        assert!(xml.contains("<size/>"));
    }

    #[test]
    fn lists_render_as_items_and_text_is_escaped() {
        let xml = metadata_xml(&record()).unwrap();
        assert!(xml.contains("<ssh_keys><item>ssh-ed25519 AAAA &lt;ops@lab&gt;</item></ssh_keys>"));
        assert!(xml.contains("<file_stem>default_web_disk1</file_stem>"));
    }

    #[test]
    fn userdata_is_left_out() {
        let xml = metadata_xml(&record()).unwrap();
        assert!(!xml.contains("secret"));
        assert!(!xml.contains("<userdata>"));
    }
}
