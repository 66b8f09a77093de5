//! Decoders for the enrichment service's XML answers.
use anyhow::{anyhow, bail, Result};
use quick_xml::events::{BytesStart, Event};
use quick_xml::reader::Reader;

use crate::models::{GameMetadata, Rank};

/// One row of a search answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchHit {
    pub id: String,
    pub name: String,
}

fn attr(e: &BytesStart<'_>, key: &str) -> Result<Option<String>> {
    match e.try_get_attribute(key)? {
        Some(a) => Ok(Some(a.unescape_value()?.into_owned())),
        None => Ok(None),
    }
}

fn tag(e: &BytesStart<'_>) -> String {
    String::from_utf8_lossy(e.name().as_ref()).into_owned()
}

/// Prefer the `type="primary"` name; otherwise keep the first one seen.
fn offer_name(slot: &mut Option<(String, bool)>, e: &BytesStart<'_>) -> Result<()> {
    let Some(value) = attr(e, "value")? else {
        return Ok(());
    };
    let primary = attr(e, "type")?.as_deref() == Some("primary");
    match slot {
        Some((_, true)) => {}
        Some(_) if !primary => {}
        _ => *slot = Some((value, primary)),
    }
    Ok(())
}

/// Parse `<items><item id=".."><name value=".."/></item>...</items>`.
pub fn parse_search(xml: &[u8]) -> Result<Vec<SearchHit>> {
    let mut reader = Reader::from_reader(xml);
    reader.config_mut().trim_text(true);

    let mut hits = Vec::new();
    let mut buf = Vec::new();
    let mut stack: Vec<String> = Vec::new();
    let mut current: Option<(String, Option<(String, bool)>)> = None;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => {
                let name = tag(&e);
                handle_search_element(&name, &e, &stack, &mut current)?;
                stack.push(name);
            }
            Ok(Event::Empty(e)) => {
                let name = tag(&e);
                handle_search_element(&name, &e, &stack, &mut current)?;
                if name == "item" {
                    close_search_item(&mut current, &mut hits);
                }
            }
            Ok(Event::End(_)) => {
                if stack.pop().as_deref() == Some("item") {
                    close_search_item(&mut current, &mut hits);
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => bail!("search XML parse error: {e}"),
            _ => {}
        }
        buf.clear();
    }
    Ok(hits)
}

fn handle_search_element(
    name: &str,
    e: &BytesStart<'_>,
    stack: &[String],
    current: &mut Option<(String, Option<(String, bool)>)>,
) -> Result<()> {
    match name {
        "item" => {
            let id = attr(e, "id")?.unwrap_or_default();
            *current = Some((id, None));
        }
        "name" if stack.last().map(String::as_str) == Some("item") => {
            if let Some((_, slot)) = current.as_mut() {
                offer_name(slot, e)?;
            }
        }
        _ => {}
    }
    Ok(())
}

fn close_search_item(
    current: &mut Option<(String, Option<(String, bool)>)>,
    hits: &mut Vec<SearchHit>,
) {
    if let Some((id, Some((name, _)))) = current.take() {
        if !id.is_empty() {
            hits.push(SearchHit { id, name });
        }
    }
}

/// Pick the identifier for `query` out of a search answer.
///
/// An exact, case-sensitive name match wins; otherwise the first hit is taken
/// as a best-effort match. `None` when there are no hits.
pub fn pick_match<'a>(query: &str, hits: &'a [SearchHit]) -> Option<&'a SearchHit> {
    hits.iter().find(|h| h.name == query).or_else(|| hits.first())
}

#[derive(Default)]
struct ThingBuilder {
    name: Option<(String, bool)>,
    year: Option<String>,
    best_with: Option<String>,
    recommended_with: Option<String>,
    average: Option<String>,
    users_rated: Option<String>,
    rank: Option<String>,
}

impl ThingBuilder {
    fn on_element(&mut self, name: &str, parent: Option<&str>, e: &BytesStart<'_>) -> Result<()> {
        match (parent, name) {
            (Some("item"), "name") => offer_name(&mut self.name, e)?,
            (Some("item"), "yearpublished") => self.year = attr(e, "value")?,
            (Some("poll-summary"), "result") => match attr(e, "name")?.as_deref() {
                Some("bestwith") => self.best_with = attr(e, "value")?,
                // Upstream spells it with three m's.
                Some("recommmendedwith") => self.recommended_with = attr(e, "value")?,
                _ => {}
            },
            (Some("ratings"), "average") => self.average = attr(e, "value")?,
            (Some("ratings"), "usersrated") => self.users_rated = attr(e, "value")?,
            (Some("ranks"), "rank") => {
                if attr(e, "name")?.as_deref() == Some("boardgame") {
                    self.rank = attr(e, "value")?;
                }
            }
            _ => {}
        }
        Ok(())
    }

    fn build(self) -> Result<GameMetadata> {
        let (title, _) = self
            .name
            .ok_or_else(|| anyhow!("details payload has no name"))?;
        Ok(GameMetadata {
            title,
            year: self.year.and_then(|y| y.trim().parse().ok()),
            best_with: self.best_with.unwrap_or_default(),
            recommended_with: self.recommended_with.unwrap_or_default(),
            avg_rating: self.average.and_then(|v| v.trim().parse().ok()),
            no_ratings: self.users_rated.and_then(|v| v.trim().parse().ok()),
            rank: self.rank.as_deref().and_then(Rank::parse),
        })
    }
}

/// Parse a `thing?stats=1` answer. Only the first `<item>` is read;
/// `Ok(None)` when the answer holds no item at all.
pub fn parse_thing(xml: &[u8]) -> Result<Option<GameMetadata>> {
    let mut reader = Reader::from_reader(xml);
    reader.config_mut().trim_text(true);

    let mut buf = Vec::new();
    let mut stack: Vec<String> = Vec::new();
    let mut builder: Option<ThingBuilder> = None;
    let mut done = false;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => {
                let name = tag(&e);
                if !done {
                    if name == "item" && builder.is_none() {
                        builder = Some(ThingBuilder::default());
                    } else if let Some(b) = builder.as_mut() {
                        b.on_element(&name, stack.last().map(String::as_str), &e)?;
                    }
                }
                stack.push(name);
            }
            Ok(Event::Empty(e)) => {
                if !done {
                    if let Some(b) = builder.as_mut() {
                        let name = tag(&e);
                        b.on_element(&name, stack.last().map(String::as_str), &e)?;
                    }
                }
            }
            Ok(Event::End(_)) => {
                if stack.pop().as_deref() == Some("item") && builder.is_some() {
                    done = true;
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => bail!("details XML parse error: {e}"),
            _ => {}
        }
        buf.clear();
    }

    builder.map(ThingBuilder::build).transpose()
}
