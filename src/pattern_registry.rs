//! Pattern Registry (C10): a small dispatch layer over independent
//! design-pattern detectors, run over the current graph contents.

use crate::graph::schema::{ClassRow, FunctionRow};
use crate::graph::store::GraphStore;
use crate::types::EntityId;
use async_trait::async_trait;
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PatternType(pub String);

impl PatternType {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }
}

#[derive(Debug, Clone)]
pub struct PatternParticipant {
    pub entity_id: EntityId,
    pub role: String,
}

#[derive(Debug, Clone)]
pub struct DetectedPattern {
    pub pattern_type: String,
    pub confidence: f64,
    pub participants: Vec<PatternParticipant>,
}

/// Context handed to every detector: the full set of class/function
/// rows currently in the graph store. Detectors are read-only and
/// never mutate the store.
pub struct DetectionContext {
    pub classes: Vec<ClassRow>,
    pub functions: Vec<FunctionRow>,
}

impl DetectionContext {
    pub async fn load<S: GraphStore>(store: &S) -> anyhow::Result<Self> {
        let classes = store.all_classes().await?;
        let functions = store.all_functions().await?;
        Ok(Self { classes, functions })
    }
}

#[derive(Debug, Clone)]
pub struct DetectionOptions {
    pub pattern_types: Option<Vec<String>>,
    pub min_confidence: f64,
}

impl Default for DetectionOptions {
    fn default() -> Self {
        Self {
            pattern_types: None,
            min_confidence: 0.5,
        }
    }
}

/// `{pattern_type, weighted heuristics}` (§4.10): one detector per
/// design pattern, each free to apply whatever scoring heuristic fits.
#[async_trait]
pub trait PatternDetector: Send + Sync {
    fn pattern_type(&self) -> &'static str;
    async fn detect(&self, context: &DetectionContext) -> anyhow::Result<Vec<DetectedPattern>>;
}

/// Flags classes exposing a private-looking static accessor
/// (`get_instance`/`getInstance`/`instance`) alongside a non-public
/// constructor convention — the common textual signature of a
/// singleton in languages without a dedicated keyword for it.
pub struct SingletonDetector;

#[async_trait]
impl PatternDetector for SingletonDetector {
    fn pattern_type(&self) -> &'static str {
        "singleton"
    }

    async fn detect(&self, context: &DetectionContext) -> anyhow::Result<Vec<DetectedPattern>> {
        let mut found = Vec::new();
        for class in &context.classes {
            let accessor = context.functions.iter().find(|f| {
                f.file_id == class.file_id
                    && matches!(f.name.as_str(), "getInstance" | "get_instance" | "instance")
            });
            if let Some(accessor) = accessor {
                found.push(DetectedPattern {
                    pattern_type: self.pattern_type().to_string(),
                    confidence: 0.7,
                    participants: vec![
                        PatternParticipant {
                            entity_id: class.id.clone(),
                            role: "singleton_class".to_string(),
                        },
                        PatternParticipant {
                            entity_id: accessor.id.clone(),
                            role: "instance_accessor".to_string(),
                        },
                    ],
                });
            }
        }
        Ok(found)
    }
}

/// Flags functions whose name suggests object construction
/// (`create*`/`make*`/`build*`/`*Factory`) and that return a type
/// matching a known class name.
pub struct FactoryDetector;

#[async_trait]
impl PatternDetector for FactoryDetector {
    fn pattern_type(&self) -> &'static str {
        "factory"
    }

    async fn detect(&self, context: &DetectionContext) -> anyhow::Result<Vec<DetectedPattern>> {
        let class_names: HashMap<&str, &ClassRow> = context.classes.iter().map(|c| (c.name.as_str(), c)).collect();
        let mut found = Vec::new();
        for function in &context.functions {
            let looks_like_factory = function.name.starts_with("create")
                || function.name.starts_with("make")
                || function.name.starts_with("build")
                || function.name.ends_with("Factory");
            if !looks_like_factory {
                continue;
            }
            let Some(return_type) = &function.return_type else {
                continue;
            };
            let bare = return_type.trim_end_matches('?').trim();
            if let Some(class) = class_names.get(bare) {
                found.push(DetectedPattern {
                    pattern_type: self.pattern_type().to_string(),
                    confidence: 0.6,
                    participants: vec![
                        PatternParticipant {
                            entity_id: function.id.clone(),
                            role: "factory_function".to_string(),
                        },
                        PatternParticipant {
                            entity_id: class.id.clone(),
                            role: "product".to_string(),
                        },
                    ],
                });
            }
        }
        Ok(found)
    }
}

/// Flags classes implementing an interface whose name suggests the
/// observer role (`*Listener`/`*Observer`/`*Subscriber`) alongside a
/// `subscribe`/`notify`/`on*` method on the same file.
pub struct ObserverDetector;

#[async_trait]
impl PatternDetector for ObserverDetector {
    fn pattern_type(&self) -> &'static str {
        "observer"
    }

    async fn detect(&self, context: &DetectionContext) -> anyhow::Result<Vec<DetectedPattern>> {
        let mut found = Vec::new();
        for class in &context.classes {
            let observer_like = class
                .implements
                .iter()
                .any(|i| i.ends_with("Listener") || i.ends_with("Observer") || i.ends_with("Subscriber"));
            if !observer_like {
                continue;
            }
            let notifier = context
                .functions
                .iter()
                .find(|f| f.file_id == class.file_id && (f.name == "subscribe" || f.name == "notify" || f.name.starts_with("on")));
            let mut participants = vec![PatternParticipant {
                entity_id: class.id.clone(),
                role: "observer".to_string(),
            }];
            if let Some(notifier) = notifier {
                participants.push(PatternParticipant {
                    entity_id: notifier.id.clone(),
                    role: "notification_handler".to_string(),
                });
            }
            found.push(DetectedPattern {
                pattern_type: self.pattern_type().to_string(),
                confidence: if notifier.is_some() { 0.65 } else { 0.45 },
                participants,
            });
        }
        Ok(found)
    }
}

fn participant_key(pattern: &DetectedPattern) -> (String, Vec<String>) {
    let mut ids: Vec<String> = pattern.participants.iter().map(|p| p.entity_id.as_str().to_string()).collect();
    ids.sort();
    (pattern.pattern_type.clone(), ids)
}

pub struct PatternRegistry {
    detectors: Vec<Box<dyn PatternDetector>>,
}

impl Default for PatternRegistry {
    fn default() -> Self {
        Self {
            detectors: vec![Box::new(SingletonDetector), Box::new(FactoryDetector), Box::new(ObserverDetector)],
        }
    }
}

impl PatternRegistry {
    pub fn new(detectors: Vec<Box<dyn PatternDetector>>) -> Self {
        Self { detectors }
    }

    /// Runs every selected detector, logging and skipping one that
    /// fails rather than aborting the whole pass, then deduplicates by
    /// `(pattern_type, sorted participant ids)` keeping the
    /// highest-confidence instance and thresholds on `min_confidence`.
    pub async fn detect(&self, context: &DetectionContext, options: &DetectionOptions) -> Vec<DetectedPattern> {
        let mut all = Vec::new();
        for detector in &self.detectors {
            if let Some(selected) = &options.pattern_types {
                if !selected.iter().any(|t| t == detector.pattern_type()) {
                    continue;
                }
            }
            match detector.detect(context).await {
                Ok(mut found) => all.append(&mut found),
                Err(e) => {
                    tracing::warn!(pattern_type = detector.pattern_type(), error = %e, "pattern detector failed, skipping");
                }
            }
        }

        let mut best: HashMap<(String, Vec<String>), DetectedPattern> = HashMap::new();
        for pattern in all {
            let key = participant_key(&pattern);
            match best.get(&key) {
                Some(existing) if existing.confidence >= pattern.confidence => {}
                _ => {
                    best.insert(key, pattern);
                }
            }
        }

        best.into_values().filter(|p| p.confidence >= options.min_confidence).collect()
    }
}
