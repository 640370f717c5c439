use quick_xml::{
    events::{BytesStart, Event},
    name::ResolveResult,
    NsReader,
};
use url::Url;

use super::{
    timeline::count_fragments,
    url::{is_absolute_url, resolve_base_url},
    Diagnostic, ManifestDocument, ProtectionHeader, QualityKey, Representation, TrackKind,
    WIDEVINE_SCHEME_ID_URI,
};
use crate::error::ParseError;

/// Parses a manifest whose `BaseURL`s are all absolute.
pub fn parse(raw: &str) -> Result<ManifestDocument, ParseError> {
    parse_with_location(raw, None)
}

/// Parses a manifest, resolving relative `BaseURL`s against `location`.
///
/// Element lookups use the namespace of the root element, whatever it is, so
/// `urn:mpeg:dash:schema:mpd:2011`, vendor namespaces and namespace-less
/// documents are all accepted.
pub fn parse_with_location(
    raw: &str,
    location: Option<&Url>,
) -> Result<ManifestDocument, ParseError> {
    if raw.trim().is_empty() {
        return Err(ParseError::Empty);
    }

    let root = read_tree(raw)?;
    let namespace = root.namespace.as_deref();

    let mut document = ManifestDocument::default();
    if root.name != "MPD" {
        document.diagnostics.push(Diagnostic::new(
            root.name.as_str(),
            "root element is not MPD",
        ));
    }

    let mut protections = Vec::new();
    for (period_index, period) in root.children(namespace, "Period").enumerate() {
        for (adaptation_index, adaptation) in
            period.children(namespace, "AdaptationSet").enumerate()
        {
            let adaptation_context = format!("Period[{period_index}]/AdaptationSet[{adaptation_index}]");
            collect_protections(adaptation, namespace, &adaptation_context, &mut protections);

            for (index, node) in adaptation.children(namespace, "Representation").enumerate() {
                let context = match node.attribute("id") {
                    Some(id) => format!("{adaptation_context}/Representation[{id}]"),
                    None => format!("{adaptation_context}/Representation[{index}]"),
                };
                collect_protections(node, namespace, &context, &mut protections);

                let scope = Scope {
                    namespace,
                    location,
                    adaptation,
                    context: &context,
                };
                if let Some(representation) = scope.read(node, &mut document.diagnostics) {
                    match representation.kind {
                        TrackKind::Video => document.videos.push(representation),
                        TrackKind::Audio => document.audios.push(representation),
                    }
                }
            }
        }
    }

    document.protection = select_protection(&protections, &mut document.diagnostics);
    Ok(document)
}

struct Scope<'a> {
    namespace: Option<&'a str>,
    location: Option<&'a Url>,
    adaptation: &'a Element,
    context: &'a str,
}

impl Scope<'_> {
    fn read(&self, node: &Element, diagnostics: &mut Vec<Diagnostic>) -> Option<Representation> {
        let mime_type = node
            .attribute("mimeType")
            .or_else(|| self.adaptation.attribute("mimeType"))
            .or_else(|| self.adaptation.attribute("contentType"));
        // text and image tracks are not downloaded
        let kind = mime_type.and_then(TrackKind::from_mime_type)?;

        let base_url = node
            .child(self.namespace, "BaseURL")
            .map(Element::text)
            .unwrap_or_default();
        if base_url.is_empty() {
            self.report(diagnostics, "missing BaseURL, representation skipped");
            return None;
        }
        let base_url = match self.location {
            Some(location) if !is_absolute_url(base_url) => {
                match resolve_base_url(location, base_url) {
                    Ok(url) => url.to_string(),
                    Err(e) => {
                        self.report(diagnostics, format!("invalid BaseURL {base_url:?}: {e}"));
                        return None;
                    }
                }
            }
            _ => base_url.to_string(),
        };

        let Some(id) = node.attribute("id") else {
            self.report(diagnostics, "missing id, representation skipped");
            return None;
        };

        let bandwidth = node.attribute("bandwidth").and_then(|b| b.trim().parse().ok());
        let quality = match kind {
            TrackKind::Video => {
                let width = positive(node.attribute("width"));
                let height = positive(node.attribute("height"));
                match (width, height) {
                    (Some(width), Some(height)) => QualityKey::Resolution { width, height },
                    _ => {
                        self.report(
                            diagnostics,
                            format!(
                                "invalid width/height: width={:?}, height={:?}",
                                node.attribute("width"),
                                node.attribute("height")
                            ),
                        );
                        return None;
                    }
                }
            }
            TrackKind::Audio => match bandwidth {
                Some(bandwidth) => QualityKey::Bandwidth(bandwidth),
                None => {
                    self.report(
                        diagnostics,
                        format!("invalid bandwidth: {:?}", node.attribute("bandwidth")),
                    );
                    return None;
                }
            },
        };

        let template = node
            .child(self.namespace, "SegmentTemplate")
            .or_else(|| self.adaptation.child(self.namespace, "SegmentTemplate"));
        let (init_template, media_template, fragment_count) = match template {
            Some(template) => {
                let fragment_count = template
                    .child(self.namespace, "SegmentTimeline")
                    .map(|timeline| {
                        count_fragments(
                            timeline.children(self.namespace, "S").map(|s| s.attribute("r")),
                            &format!("{}/SegmentTimeline", self.context),
                            diagnostics,
                        )
                    })
                    .unwrap_or(0);
                (
                    template.attribute("initialization").map(str::to_string),
                    template.attribute("media").map(str::to_string),
                    fragment_count,
                )
            }
            None => (None, None, 0),
        };

        Some(Representation {
            id: id.to_string(),
            kind,
            base_url,
            init_template,
            media_template,
            fragment_count,
            quality,
            bandwidth,
        })
    }

    fn report(&self, diagnostics: &mut Vec<Diagnostic>, message: impl Into<String>) {
        diagnostics.push(Diagnostic::new(self.context, message));
    }
}

fn positive(value: Option<&str>) -> Option<u64> {
    value
        .and_then(|v| v.trim().parse::<u64>().ok())
        .filter(|v| *v > 0)
}

struct ProtectionCandidate {
    widevine: bool,
    data: String,
    context: String,
}

fn collect_protections(
    element: &Element,
    namespace: Option<&str>,
    context: &str,
    candidates: &mut Vec<ProtectionCandidate>,
) {
    for protection in element.children(namespace, "ContentProtection") {
        let widevine = protection
            .attribute("schemeIdUri")
            .is_some_and(|scheme| scheme.eq_ignore_ascii_case(WIDEVINE_SCHEME_ID_URI));
        // cenc:pssh lives in its own namespace, so match on the local name only
        let pssh = protection
            .children
            .iter()
            .find(|child| child.name == "pssh" && !child.text().is_empty());
        if let Some(pssh) = pssh {
            candidates.push(ProtectionCandidate {
                widevine,
                data: pssh.text().to_string(),
                context: context.to_string(),
            });
        }
    }
}

fn select_protection(
    candidates: &[ProtectionCandidate],
    diagnostics: &mut Vec<Diagnostic>,
) -> Option<ProtectionHeader> {
    let widevine_first = candidates
        .iter()
        .filter(|c| c.widevine)
        .chain(candidates.iter().filter(|c| !c.widevine));
    for candidate in widevine_first {
        match ProtectionHeader::from_base64(&candidate.data) {
            Ok(header) => return Some(header),
            Err(e) => diagnostics.push(Diagnostic::new(
                candidate.context.as_str(),
                format!("invalid pssh: {e}"),
            )),
        }
    }
    None
}

struct Element {
    namespace: Option<String>,
    name: String,
    attributes: Vec<(String, String)>,
    text: String,
    children: Vec<Element>,
}

impl Element {
    fn from_start(start: &BytesStart, namespace: Option<String>) -> Result<Self, ParseError> {
        let name = String::from_utf8_lossy(start.local_name().as_ref()).into_owned();

        let mut attributes = Vec::new();
        for attribute in start.attributes() {
            let attribute = attribute.map_err(|e| ParseError::Malformed(e.to_string()))?;
            if attribute.key.as_namespace_binding().is_some() {
                continue;
            }
            let key = String::from_utf8_lossy(attribute.key.local_name().as_ref()).into_owned();
            let value = attribute
                .unescape_value()
                .map_err(|e| ParseError::Malformed(e.to_string()))?
                .into_owned();
            attributes.push((key, value));
        }

        Ok(Self {
            namespace,
            name,
            attributes,
            text: String::new(),
            children: Vec::new(),
        })
    }

    fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Children with the given local name in the given namespace.
    fn children<'a>(
        &'a self,
        namespace: Option<&'a str>,
        name: &'a str,
    ) -> impl Iterator<Item = &'a Element> + 'a {
        self.children
            .iter()
            .filter(move |child| child.name == name && child.namespace.as_deref() == namespace)
    }

    fn child<'a>(&'a self, namespace: Option<&'a str>, name: &'a str) -> Option<&'a Element> {
        self.children(namespace, name).next()
    }

    fn text(&self) -> &str {
        self.text.trim()
    }
}

fn resolve_namespace(resolved: ResolveResult<'_>) -> Result<Option<String>, ParseError> {
    match resolved {
        ResolveResult::Bound(namespace) => Ok(Some(
            String::from_utf8_lossy(namespace.into_inner()).into_owned(),
        )),
        ResolveResult::Unbound => Ok(None),
        ResolveResult::Unknown(prefix) => Err(ParseError::Malformed(format!(
            "unbound namespace prefix {:?}",
            String::from_utf8_lossy(&prefix)
        ))),
    }
}

fn attach(
    stack: &mut [Element],
    root: &mut Option<Element>,
    element: Element,
) -> Result<(), ParseError> {
    match stack.last_mut() {
        Some(parent) => parent.children.push(element),
        None if root.is_none() => *root = Some(element),
        None => return Err(ParseError::Malformed("multiple root elements".to_string())),
    }
    Ok(())
}

fn read_tree(raw: &str) -> Result<Element, ParseError> {
    let mut reader = NsReader::from_str(raw);
    let mut stack: Vec<Element> = Vec::new();
    let mut root = None;

    loop {
        let (resolved, event) = match reader.read_resolved_event() {
            Ok(result) => result,
            Err(e) => return Err(ParseError::Malformed(e.to_string())),
        };

        match event {
            Event::Start(start) => {
                let element = Element::from_start(&start, resolve_namespace(resolved)?)?;
                stack.push(element);
            }
            Event::Empty(start) => {
                let element = Element::from_start(&start, resolve_namespace(resolved)?)?;
                attach(&mut stack, &mut root, element)?;
            }
            Event::End(_) => {
                let element = stack.pop().ok_or_else(|| {
                    ParseError::Malformed("unexpected closing tag".to_string())
                })?;
                attach(&mut stack, &mut root, element)?;
            }
            Event::Text(text) => {
                if let Some(current) = stack.last_mut() {
                    let text = text
                        .unescape()
                        .map_err(|e| ParseError::Malformed(e.to_string()))?;
                    current.text.push_str(&text);
                }
            }
            Event::CData(data) => {
                if let Some(current) = stack.last_mut() {
                    current
                        .text
                        .push_str(&String::from_utf8_lossy(&data.into_inner()));
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if let Some(open) = stack.last() {
        return Err(ParseError::Malformed(format!(
            "unexpected end of document, <{}> is not closed",
            open.name
        )));
    }
    root.ok_or_else(|| ParseError::Malformed("no root element".to_string()))
}
