use quick_xml::events::Event;
use quick_xml::{Reader, Writer};

use crate::SvgError;

/// 以两个空格缩进重新排版 XML 文本。
pub fn pretty_xml(markup: &str) -> Result<String, SvgError> {
    let mut reader = Reader::from_str(markup);
    reader.trim_text(true);
    let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);

    loop {
        let event = reader.read_event()?;
        if let Event::Eof = event {
            break;
        }
        writer.write_event(event)?;
    }

    Ok(String::from_utf8(writer.into_inner())?)
}
