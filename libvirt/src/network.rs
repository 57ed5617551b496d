use regex::Regex;

/// What a virtual network reports about itself.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NetworkInfo {
    pub domain: Option<String>,
    pub gateway: Option<String>,
    pub netmask: Option<String>,
    pub dhcp_start: Option<String>,
    pub dhcp_end: Option<String>,
}

impl NetworkInfo {
    /// Read the first `<domain>`, `<ip>` and `<dhcp><range>` of a network descriptor.
    pub fn from_xml(xml: &str) -> Self {
        let ip = first_tag(xml, "ip");
        let range = xml
            .find("<dhcp")
            .and_then(|start| first_tag(&xml[start..], "range"));

        NetworkInfo {
            domain: first_tag(xml, "domain").and_then(|tag| attribute(tag, "name")),
            gateway: ip.and_then(|tag| attribute(tag, "address")),
            netmask: ip.and_then(|tag| attribute(tag, "netmask")),
            dhcp_start: range.and_then(|tag| attribute(tag, "start")),
            dhcp_end: range.and_then(|tag| attribute(tag, "end")),
        }
    }
}

fn first_tag<'a>(xml: &'a str, tag: &str) -> Option<&'a str> {
    let pattern = Regex::new(&format!(r"<{}\b[^>]*>", regex::escape(tag))).ok()?;
    pattern.find(xml).map(|found| found.as_str())
}

fn attribute(tag: &str, name: &str) -> Option<String> {
    let pattern = Regex::new(&format!(
        r#"\s{}\s*=\s*(?:'([^']*)'|"([^"]*)")"#,
        regex::escape(name)
    ))
    .ok()?;
    let captures = pattern.captures(tag)?;
    captures
        .get(1)
        .or_else(|| captures.get(2))
        .map(|value| value.as_str().to_owned())
}
