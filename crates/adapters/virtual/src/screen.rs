//! Scripted screen model behind [`crate::VirtualDevice`].
//!
//! The screen is a list of visible elements (template matches), OCR text
//! blocks, coloured regions and reactions that change the screen when the
//! device is tapped or an app is launched.

use serde::{Deserialize, Serialize};

use minibot_domain::vision::{Hsv, Location, Region, TemplateId};

/// A template currently visible on screen.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Element {
    pub(crate) template: TemplateId,
    pub(crate) location: Location,
    /// Stays on screen when tapped.
    pub(crate) persistent: bool,
}

/// What the screen does in response to an input.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Reaction {
    Reveal(Element),
    Hide(TemplateId),
    SetText(Option<Region>, String),
}

/// Input received by the device, in order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Action {
    Tap { x: u32, y: u32 },
    Swipe { from: (u32, u32), to: (u32, u32), duration_ms: u64 },
    InputText { text: String },
    LaunchApp { app_id: String },
}

#[derive(Debug)]
pub(crate) struct Screen {
    pub(crate) reachable: bool,
    pub(crate) captures: u64,
    pub(crate) elements: Vec<Element>,
    /// OCR text per region; `None` is the text of the whole screen.
    pub(crate) text: Vec<(Option<Region>, String)>,
    pub(crate) colors: Vec<(Hsv, Region)>,
    pub(crate) on_tap: Vec<(TemplateId, Reaction)>,
    pub(crate) on_launch: Vec<(String, Reaction)>,
    pub(crate) actions: Vec<Action>,
}

impl Default for Screen {
    fn default() -> Self {
        Self {
            reachable: true,
            captures: 0,
            elements: Vec::new(),
            text: Vec::new(),
            colors: Vec::new(),
            on_tap: Vec::new(),
            on_launch: Vec::new(),
            actions: Vec::new(),
        }
    }
}

impl Screen {
    pub(crate) fn matches(&self, template: &TemplateId, confidence: f32) -> Vec<Location> {
        self.elements
            .iter()
            .filter(|e| &e.template == template && e.location.confidence >= confidence)
            .map(|e| e.location)
            .collect()
    }

    /// Text of the block covering `region`, falling back to the whole screen.
    pub(crate) fn text_at(&self, region: Option<Region>) -> String {
        let exact = self
            .text
            .iter()
            .find(|(r, _)| *r == region)
            .map(|(_, text)| text.clone());
        exact
            .or_else(|| {
                let (x, y) = region?.center();
                self.text
                    .iter()
                    .find(|(r, _)| r.is_some_and(|r| r.contains(x, y)))
                    .map(|(_, text)| text.clone())
            })
            .or_else(|| {
                self.text
                    .iter()
                    .find(|(r, _)| r.is_none())
                    .map(|(_, text)| text.clone())
            })
            .unwrap_or_default()
    }

    pub(crate) fn colored(&self, lower: Hsv, upper: Hsv) -> Vec<Location> {
        self.colors
            .iter()
            .filter(|(colour, _)| colour.within(lower, upper))
            .map(|(_, region)| Location::new(*region, 1.0))
            .collect()
    }

    /// Apply a tap at `(x, y)`: dismiss what was hit and run its reactions.
    pub(crate) fn tap(&mut self, x: u32, y: u32) {
        self.actions.push(Action::Tap { x, y });
        let hit: Vec<TemplateId> = self
            .elements
            .iter()
            .filter(|e| e.location.region.contains(x, y))
            .map(|e| e.template.clone())
            .collect();
        self.elements
            .retain(|e| e.persistent || !e.location.region.contains(x, y));
        self.colors.retain(|(_, region)| !region.contains(x, y));

        let reactions: Vec<Reaction> = self
            .on_tap
            .iter()
            .filter(|(template, _)| hit.contains(template))
            .map(|(_, reaction)| reaction.clone())
            .collect();
        for reaction in reactions {
            self.react(reaction);
        }
    }

    pub(crate) fn launch(&mut self, app_id: &str) {
        self.actions.push(Action::LaunchApp {
            app_id: app_id.to_string(),
        });
        let reactions: Vec<Reaction> = self
            .on_launch
            .iter()
            .filter(|(app, _)| app == app_id)
            .map(|(_, reaction)| reaction.clone())
            .collect();
        for reaction in reactions {
            self.react(reaction);
        }
    }

    pub(crate) fn react(&mut self, reaction: Reaction) {
        match reaction {
            Reaction::Reveal(element) => {
                if !self.elements.contains(&element) {
                    self.elements.push(element);
                }
            }
            Reaction::Hide(template) => self.elements.retain(|e| e.template != template),
            Reaction::SetText(region, text) => self.set_text(region, text),
        }
    }

    pub(crate) fn set_text(&mut self, region: Option<Region>, text: String) {
        match self.text.iter_mut().find(|(r, _)| *r == region) {
            Some(entry) => entry.1 = text,
            None => self.text.push((region, text)),
        }
    }
}
