/// Filter rule configuration: metrics, operators and the ordered rule set
use crate::error::Error;
use crate::junction::Junction;
use serde::Deserialize;
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::path::Path;

const DEFAULT_RULES_JSON: &str = include_str!("../../data/default_filter.json");

/// A junction property a rule can test.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Metric {
    SupportCount,
    Entropy,
    Coverage,
    /// 1 canonical, 0.5 semi-canonical, 0 non-canonical
    Canonical,
    IntronSize,
    AnchorSpan,
    MaxLeftOverhang,
    MaxRightOverhang,
}

impl Metric {
    /// Value for one junction. `None` when the metric needs finalization
    /// and the junction has not been finalized.
    pub fn value(&self, junction: &Junction) -> Option<f64> {
        let metrics = junction.metrics();
        Some(match self {
            Metric::SupportCount => junction.support_count() as f64,
            Metric::Entropy => metrics?.entropy,
            Metric::Coverage => metrics?.coverage,
            Metric::Canonical => metrics?.canonical.score(),
            Metric::IntronSize => junction.intron().size() as f64,
            Metric::AnchorSpan => junction.anchor_span() as f64,
            Metric::MaxLeftOverhang => junction.max_left_overhang() as f64,
            Metric::MaxRightOverhang => junction.max_right_overhang() as f64,
        })
    }
}

impl std::str::FromStr for Metric {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "support_count" => Ok(Self::SupportCount),
            "entropy" => Ok(Self::Entropy),
            "coverage" => Ok(Self::Coverage),
            "canonical" => Ok(Self::Canonical),
            "intron_size" => Ok(Self::IntronSize),
            "anchor_span" => Ok(Self::AnchorSpan),
            "max_left_overhang" => Ok(Self::MaxLeftOverhang),
            "max_right_overhang" => Ok(Self::MaxRightOverhang),
            _ => Err(format!("unknown metric '{s}'")),
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::SupportCount => "support_count",
            Self::Entropy => "entropy",
            Self::Coverage => "coverage",
            Self::Canonical => "canonical",
            Self::IntronSize => "intron_size",
            Self::AnchorSpan => "anchor_span",
            Self::MaxLeftOverhang => "max_left_overhang",
            Self::MaxRightOverhang => "max_right_overhang",
        };
        f.write_str(name)
    }
}

/// Comparison between a metric value and a rule threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Gt,
    Gte,
    Lt,
    Lte,
    Eq,
    Ne,
}

impl Operator {
    pub fn apply(&self, value: f64, threshold: f64) -> bool {
        match self {
            Operator::Gt => value > threshold,
            Operator::Gte => value >= threshold,
            Operator::Lt => value < threshold,
            Operator::Lte => value <= threshold,
            Operator::Eq => value == threshold,
            Operator::Ne => value != threshold,
        }
    }
}

impl std::str::FromStr for Operator {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "gt" | ">" => Ok(Self::Gt),
            "gte" | ">=" => Ok(Self::Gte),
            "lt" | "<" => Ok(Self::Lt),
            "lte" | "<=" => Ok(Self::Lte),
            "eq" | "==" => Ok(Self::Eq),
            "ne" | "!=" => Ok(Self::Ne),
            _ => Err(format!("unknown operator '{s}'")),
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Gt => "gt",
            Self::Gte => "gte",
            Self::Lt => "lt",
            Self::Lte => "lte",
            Self::Eq => "eq",
            Self::Ne => "ne",
        };
        f.write_str(name)
    }
}

/// One threshold predicate over one metric.
#[derive(Debug, Clone, PartialEq)]
pub struct Rule {
    pub id: String,
    pub metric: Metric,
    pub operator: Operator,
    pub threshold: f64,
}

impl Rule {
    pub fn passes(&self, junction: &Junction) -> bool {
        self.metric
            .value(junction)
            .is_some_and(|v| self.operator.apply(v, self.threshold))
    }
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} {} {}",
            self.id, self.metric, self.operator, self.threshold
        )
    }
}

/// Logistic score from a trained linear model over junction metrics.
#[derive(Debug, Clone, PartialEq)]
pub struct Classifier {
    pub id: String,
    pub threshold: f64,
    pub intercept: f64,
    pub weights: Vec<(Metric, f64)>,
}

impl Classifier {
    /// Probability-like score in `(0, 1)`.
    pub fn score(&self, junction: &Junction) -> Option<f64> {
        let mut z = self.intercept;
        for (metric, weight) in &self.weights {
            z += weight * metric.value(junction)?;
        }
        Some(1.0 / (1.0 + (-z).exp()))
    }

    pub fn passes(&self, junction: &Junction) -> bool {
        self.score(junction).is_some_and(|s| s >= self.threshold)
    }
}

/// One entry of the ordered predicate list.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    Rule(Rule),
    Classifier(Classifier),
}

impl Predicate {
    pub fn id(&self) -> &str {
        match self {
            Predicate::Rule(r) => &r.id,
            Predicate::Classifier(c) => &c.id,
        }
    }

    pub fn passes(&self, junction: &Junction) -> bool {
        match self {
            Predicate::Rule(r) => r.passes(junction),
            Predicate::Classifier(c) => c.passes(junction),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawRuleSet {
    #[serde(default)]
    rules: Vec<RawRule>,
    #[serde(default)]
    classifier: Option<RawClassifier>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawRule {
    id: String,
    metric: String,
    operator: String,
    threshold: f64,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawClassifier {
    id: String,
    threshold: f64,
    #[serde(default)]
    intercept: f64,
    weights: BTreeMap<String, f64>,
}

/// Ordered list of predicates; the classifier, if any, is evaluated last.
///
/// Everything is validated at load time so evaluation cannot fail.
#[derive(Debug, Clone, PartialEq)]
pub struct RuleSet {
    predicates: Vec<Predicate>,
}

impl RuleSet {
    pub fn new(predicates: Vec<Predicate>) -> Result<Self, Error> {
        let mut seen = HashSet::new();
        for p in &predicates {
            if p.id().is_empty() {
                return Err(Error::Configuration("rule with empty id".into()));
            }
            if !seen.insert(p.id().to_string()) {
                return Err(Error::Configuration(format!(
                    "duplicate rule id '{}'",
                    p.id()
                )));
            }
        }
        Ok(Self { predicates })
    }

    /// Built-in rule set.
    pub fn default_rules() -> Result<Self, Error> {
        Self::from_json(DEFAULT_RULES_JSON)
    }

    pub fn from_file(path: &Path) -> Result<Self, Error> {
        let text = std::fs::read_to_string(path).map_err(|e| Error::io(e, path))?;
        Self::from_json(&text).map_err(|e| match e {
            Error::Configuration(msg) => {
                Error::Configuration(format!("{}: {}", path.display(), msg))
            }
            other => other,
        })
    }

    pub fn from_json(text: &str) -> Result<Self, Error> {
        let raw: RawRuleSet = serde_json::from_str(text)
            .map_err(|e| Error::Configuration(format!("invalid rule file: {e}")))?;

        let mut predicates = Vec::with_capacity(raw.rules.len() + 1);
        for rule in raw.rules {
            let metric = rule.metric.parse().map_err(|e| {
                Error::Configuration(format!("rule '{}': {}", rule.id, e))
            })?;
            let operator = rule.operator.parse().map_err(|e| {
                Error::Configuration(format!("rule '{}': {}", rule.id, e))
            })?;
            if !rule.threshold.is_finite() {
                return Err(Error::Configuration(format!(
                    "rule '{}': threshold must be finite",
                    rule.id
                )));
            }
            predicates.push(Predicate::Rule(Rule {
                id: rule.id,
                metric,
                operator,
                threshold: rule.threshold,
            }));
        }

        if let Some(c) = raw.classifier {
            if c.weights.is_empty() {
                return Err(Error::Configuration(format!(
                    "classifier '{}': no weights",
                    c.id
                )));
            }
            let weights = c
                .weights
                .iter()
                .map(|(name, &w)| {
                    let metric: Metric = name.parse().map_err(|e| {
                        Error::Configuration(format!("classifier '{}': {}", c.id, e))
                    })?;
                    Ok((metric, w))
                })
                .collect::<Result<Vec<_>, Error>>()?;
            predicates.push(Predicate::Classifier(Classifier {
                id: c.id,
                threshold: c.threshold,
                intercept: c.intercept,
                weights,
            }));
        }

        Self::new(predicates)
    }

    pub fn predicates(&self) -> &[Predicate] {
        &self.predicates
    }

    pub fn len(&self) -> usize {
        self.predicates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.predicates.is_empty()
    }
}
