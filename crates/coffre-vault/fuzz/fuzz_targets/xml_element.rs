#![no_main]

use coffre_vault::document::xml::XmlElement;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &str| {
    // Must never panic; anything that parses must also render.
    if let Ok(root) = XmlElement::parse(data) {
        let text = root.to_xml_string().unwrap();
        let _ = XmlElement::parse(&text);
    }
});
