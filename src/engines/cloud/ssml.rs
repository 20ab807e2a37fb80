use xml::writer::{Error as XmlError, XmlEvent};
use xml::{EmitterConfig, EventWriter};

const SYNTHESIS_NS: &str = "http://www.w3.org/2001/10/synthesis";
const MSTTS_NS: &str = "https://www.w3.org/2001/mstts";

/// Voice and prosody attributes wrapped around the literal text.
#[derive(Debug, Clone, Copy)]
pub struct SsmlVoice<'a> {
    pub name: &'a str,
    pub language: &'a str,
    pub style: Option<&'a str>,
    pub role: Option<&'a str>,
}

/// Build the speak document for one request.
///
/// `<speak><voice>[<mstts:express-as>]text[</mstts:express-as>]</voice></speak>`.
/// Text is escaped by the writer. Tags close in reverse order of opening.
pub fn build(voice: &SsmlVoice<'_>, text: &str) -> Result<String, XmlError> {
    let mut writer = EventWriter::new_with_config(
        Vec::new(),
        EmitterConfig::new()
            .write_document_declaration(false)
            .keep_element_names_stack(false),
    );

    writer.write(
        XmlEvent::start_element("speak")
            .default_ns(SYNTHESIS_NS)
            .ns("mstts", MSTTS_NS)
            .attr("version", "1.0")
            .attr("xml:lang", voice.language),
    )?;
    writer.write(XmlEvent::start_element("voice").attr("name", voice.name))?;

    let style = voice.style.filter(|s| !s.is_empty());
    let role = voice.role.filter(|r| !r.is_empty());
    let expressive = style.is_some() || role.is_some();
    if expressive {
        let mut express = XmlEvent::start_element("mstts:express-as");
        if let Some(style) = style {
            express = express.attr("style", style);
        }
        if let Some(role) = role {
            express = express.attr("role", role);
        }
        writer.write(express)?;
    }

    writer.write(XmlEvent::characters(text))?;

    if expressive {
        writer.write(XmlEvent::end_element().name("mstts:express-as"))?;
    }
    writer.write(XmlEvent::end_element().name("voice"))?;
    writer.write(XmlEvent::end_element().name("speak"))?;

    String::from_utf8(writer.into_inner()).map_err(|e| {
        XmlError::Io(std::io::Error::new(std::io::ErrorKind::InvalidData, e))
    })
}
