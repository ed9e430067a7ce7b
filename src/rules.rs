//! Form scoring.
//!
//! Every rule starts from the same baseline and contributes an independent delta; the sum is
//! clamped to `[0, 100]` and a headline chosen from the score bands is put in front of the
//! warnings. Evaluation never fails: a rule whose measures did not resolve contributes nothing.

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, Result};
use crate::geometry::Measurements;
use crate::tracker::ActiveWhen;

pub const BASELINE_SCORE: f32 = 100.0;

/// Reference values below this magnitude make a ratio meaningless.
const MIN_REFERENCE: f32 = 1e-6;

/// What a rule can see for the current frame.
#[derive(Debug, Clone, Copy)]
pub struct RuleContext<'a> {
    pub raw: &'a Measurements,
    /// Smoothed tracking signals; rules fall back to `raw` for anything else.
    pub smoothed: &'a Measurements,
    pub stage: &'a str,
}

impl<'a> RuleContext<'a> {
    fn value(&self, name: &str, smoothed: bool) -> Option<f32> {
        if smoothed {
            if let Some(v) = self.smoothed.get(name) {
                return Some(v);
            }
        }
        self.raw.get(name)
    }
}

/// Depth / range check on one measure, in the direction of the working position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RangeOfMotionRule {
    pub id: String,
    pub measure: String,
    pub direction: ActiveWhen,
    pub excellent: f32,
    #[serde(default)]
    pub excellent_bonus: f32,
    #[serde(default)]
    pub excellent_message: Option<String>,
    pub good: f32,
    #[serde(default)]
    pub good_message: Option<String>,
    /// Penalty applies beyond this value; defaults to `good`.
    #[serde(default)]
    pub shallow: Option<f32>,
    #[serde(default)]
    pub shallow_penalty: f32,
    #[serde(default)]
    pub shallow_message: Option<String>,
    /// Only evaluated while the machine reports this stage.
    #[serde(default)]
    pub when_stage: Option<String>,
    #[serde(default)]
    pub smoothed: bool,
}

/// Left/right difference check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SymmetryRule {
    pub id: String,
    pub left: String,
    pub right: String,
    pub max_difference: f32,
    pub penalty: f32,
    pub message: String,
    #[serde(default)]
    pub ok_message: Option<String>,
    #[serde(default)]
    pub smoothed: bool,
}

/// `subject / reference` must lie in `[min_ratio, max_ratio]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlignmentRule {
    pub id: String,
    pub subject: String,
    pub reference: String,
    pub min_ratio: f32,
    pub max_ratio: f32,
    #[serde(default)]
    pub below_penalty: f32,
    #[serde(default)]
    pub below_message: Option<String>,
    #[serde(default)]
    pub above_penalty: f32,
    #[serde(default)]
    pub above_message: Option<String>,
    #[serde(default)]
    pub ok_message: Option<String>,
    #[serde(default)]
    pub smoothed: bool,
}

/// Measure must lie in `[min, max]`; either bound may be open.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostureRule {
    pub id: String,
    pub measure: String,
    #[serde(default)]
    pub min: Option<f32>,
    #[serde(default)]
    pub max: Option<f32>,
    #[serde(default)]
    pub below_penalty: f32,
    #[serde(default)]
    pub below_message: Option<String>,
    #[serde(default)]
    pub above_penalty: f32,
    #[serde(default)]
    pub above_message: Option<String>,
    #[serde(default)]
    pub ok_message: Option<String>,
    #[serde(default)]
    pub when_stage: Option<String>,
    #[serde(default)]
    pub smoothed: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FormRule {
    RangeOfMotion(RangeOfMotionRule),
    Symmetry(SymmetryRule),
    Alignment(AlignmentRule),
    Posture(PostureRule),
}

/// One rule's contribution for one frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FormRuleResult {
    pub rule_id: String,
    pub score_delta: f32,
    pub message: Option<String>,
}

impl FormRuleResult {
    fn none(id: &str) -> Self {
        Self {
            rule_id: id.to_string(),
            score_delta: 0.0,
            message: None,
        }
    }

    fn new(id: &str, score_delta: f32, message: Option<&String>) -> Self {
        Self {
            rule_id: id.to_string(),
            score_delta,
            message: message.cloned(),
        }
    }
}

fn stage_matches(when_stage: &Option<String>, stage: &str) -> bool {
    when_stage.as_deref().map_or(true, |s| s == stage)
}

impl FormRule {
    pub fn id(&self) -> &str {
        match self {
            FormRule::RangeOfMotion(r) => &r.id,
            FormRule::Symmetry(r) => &r.id,
            FormRule::Alignment(r) => &r.id,
            FormRule::Posture(r) => &r.id,
        }
    }

    /// Measure names this rule reads.
    pub fn measures(&self) -> Vec<&str> {
        match self {
            FormRule::RangeOfMotion(r) => vec![r.measure.as_str()],
            FormRule::Symmetry(r) => vec![r.left.as_str(), r.right.as_str()],
            FormRule::Alignment(r) => vec![r.subject.as_str(), r.reference.as_str()],
            FormRule::Posture(r) => vec![r.measure.as_str()],
        }
    }

    pub fn validate(&self, exercise: &str) -> Result<()> {
        let check = |ok: bool, reason: String| {
            if ok {
                Ok(())
            } else {
                Err(ConfigError::thresholds(exercise, reason))
            }
        };
        match self {
            FormRule::RangeOfMotion(r) => {
                let shallow = r.shallow.unwrap_or(r.good);
                let ordered = match r.direction {
                    ActiveWhen::Below => r.excellent <= r.good && r.good <= shallow,
                    ActiveWhen::Above => r.excellent >= r.good && r.good >= shallow,
                };
                check(ordered, format!("rule {}: excellent/good/shallow out of order", r.id))
            }
            FormRule::Symmetry(r) => check(
                r.max_difference >= 0.0,
                format!("rule {}: max_difference must not be negative", r.id),
            ),
            FormRule::Alignment(r) => check(
                r.min_ratio <= r.max_ratio,
                format!("rule {}: min_ratio above max_ratio", r.id),
            ),
            FormRule::Posture(r) => match (r.min, r.max) {
                (Some(min), Some(max)) => {
                    check(min <= max, format!("rule {}: min above max", r.id))
                }
                (None, None) => check(false, format!("rule {}: needs min or max", r.id)),
                _ => Ok(()),
            },
        }
    }

    pub fn evaluate(&self, ctx: &RuleContext) -> FormRuleResult {
        match self {
            FormRule::RangeOfMotion(r) => range_of_motion(r, ctx),
            FormRule::Symmetry(r) => symmetry(r, ctx),
            FormRule::Alignment(r) => alignment(r, ctx),
            FormRule::Posture(r) => posture(r, ctx),
        }
    }
}

fn range_of_motion(r: &RangeOfMotionRule, ctx: &RuleContext) -> FormRuleResult {
    if !stage_matches(&r.when_stage, ctx.stage) {
        return FormRuleResult::none(&r.id);
    }
    let Some(v) = ctx.value(&r.measure, r.smoothed) else {
        return FormRuleResult::none(&r.id);
    };
    let shallow = r.shallow.unwrap_or(r.good);
    // 「深い」側を below に揃えて比較する
    let (v, excellent, good, shallow) = match r.direction {
        ActiveWhen::Below => (v, r.excellent, r.good, shallow),
        ActiveWhen::Above => (-v, -r.excellent, -r.good, -shallow),
    };
    if v < excellent {
        FormRuleResult::new(&r.id, r.excellent_bonus, r.excellent_message.as_ref())
    } else if v < good {
        FormRuleResult::new(&r.id, 0.0, r.good_message.as_ref())
    } else if v > shallow {
        FormRuleResult::new(&r.id, -r.shallow_penalty, r.shallow_message.as_ref())
    } else {
        FormRuleResult::none(&r.id)
    }
}

fn symmetry(r: &SymmetryRule, ctx: &RuleContext) -> FormRuleResult {
    let (Some(left), Some(right)) = (ctx.value(&r.left, r.smoothed), ctx.value(&r.right, r.smoothed)) else {
        return FormRuleResult::none(&r.id);
    };
    if (left - right).abs() > r.max_difference {
        FormRuleResult::new(&r.id, -r.penalty, Some(&r.message))
    } else {
        FormRuleResult::new(&r.id, 0.0, r.ok_message.as_ref())
    }
}

fn alignment(r: &AlignmentRule, ctx: &RuleContext) -> FormRuleResult {
    let (Some(subject), Some(reference)) =
        (ctx.value(&r.subject, r.smoothed), ctx.value(&r.reference, r.smoothed))
    else {
        return FormRuleResult::none(&r.id);
    };
    if reference.abs() < MIN_REFERENCE {
        return FormRuleResult::none(&r.id);
    }
    let ratio = subject / reference;
    if ratio < r.min_ratio {
        FormRuleResult::new(&r.id, -r.below_penalty, r.below_message.as_ref())
    } else if ratio > r.max_ratio {
        FormRuleResult::new(&r.id, -r.above_penalty, r.above_message.as_ref())
    } else {
        FormRuleResult::new(&r.id, 0.0, r.ok_message.as_ref())
    }
}

fn posture(r: &PostureRule, ctx: &RuleContext) -> FormRuleResult {
    if !stage_matches(&r.when_stage, ctx.stage) {
        return FormRuleResult::none(&r.id);
    }
    let Some(v) = ctx.value(&r.measure, r.smoothed) else {
        return FormRuleResult::none(&r.id);
    };
    if r.min.is_some_and(|min| v < min) {
        FormRuleResult::new(&r.id, -r.below_penalty, r.below_message.as_ref())
    } else if r.max.is_some_and(|max| v > max) {
        FormRuleResult::new(&r.id, -r.above_penalty, r.above_message.as_ref())
    } else {
        FormRuleResult::new(&r.id, 0.0, r.ok_message.as_ref())
    }
}

/// Headline shown for scores at or above `min_score`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Headline {
    pub min_score: f32,
    pub message: String,
}

impl Headline {
    pub fn new(min_score: f32, message: &str) -> Self {
        Self {
            min_score,
            message: message.to_string(),
        }
    }
}

pub fn default_headlines() -> Vec<Headline> {
    vec![
        Headline::new(90.0, "Perfect form!"),
        Headline::new(80.0, "Great form!"),
        Headline::new(70.0, "Good form, minor adjustments needed"),
        Headline::new(0.0, "Focus on form improvements"),
    ]
}

/// Highest band the score reaches; bands may be given in any order.
pub fn headline_for(headlines: &[Headline], score: f32) -> Option<&str> {
    headlines
        .iter()
        .filter(|h| score >= h.min_score)
        .max_by(|a, b| a.min_score.total_cmp(&b.min_score))
        .map(|h| h.message.as_str())
}

#[derive(Debug, Clone, PartialEq)]
pub struct FormEvaluation {
    /// In `[0, 100]`.
    pub score: f32,
    /// Headline first, then rule messages in rule order.
    pub warnings: Vec<String>,
    pub results: Vec<FormRuleResult>,
}

pub fn evaluate(rules: &[FormRule], headlines: &[Headline], ctx: &RuleContext) -> FormEvaluation {
    let results: Vec<FormRuleResult> = rules.iter().map(|rule| rule.evaluate(ctx)).collect();
    let total: f32 = results
        .iter()
        .map(|r| r.score_delta)
        .filter(|d| d.is_finite())
        .sum();
    let score = (BASELINE_SCORE + total).clamp(0.0, 100.0);

    let mut warnings = Vec::with_capacity(results.len() + 1);
    if let Some(headline) = headline_for(headlines, score) {
        warnings.push(headline.to_string());
    }
    warnings.extend(results.iter().filter_map(|r| r.message.clone()));

    FormEvaluation {
        score,
        warnings,
        results,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx_eq(a: f32, b: f32) -> bool {
        (a - b).abs() < 1e-4
    }

    fn depth_rule() -> FormRule {
        FormRule::RangeOfMotion(RangeOfMotionRule {
            id: "depth".to_string(),
            measure: "hip_drop".to_string(),
            direction: ActiveWhen::Below,
            excellent: -0.05,
            excellent_bonus: 5.0,
            excellent_message: Some("Excellent depth!".to_string()),
            good: -0.02,
            good_message: Some("Good depth!".to_string()),
            shallow: Some(0.05),
            shallow_penalty: 20.0,
            shallow_message: Some("Go deeper".to_string()),
            when_stage: None,
            smoothed: false,
        })
    }

    fn knees_rule() -> FormRule {
        FormRule::Alignment(AlignmentRule {
            id: "knees".to_string(),
            subject: "knee_width".to_string(),
            reference: "ankle_width".to_string(),
            min_ratio: 0.8,
            max_ratio: 1.3,
            below_penalty: 15.0,
            below_message: Some("Keep knees aligned with toes".to_string()),
            above_penalty: 5.0,
            above_message: Some("Knees slightly too wide".to_string()),
            ok_message: Some("Good knee alignment!".to_string()),
            smoothed: false,
        })
    }

    fn measurements(pairs: &[(&str, f32)]) -> Measurements {
        let mut m = Measurements::new();
        for &(k, v) in pairs {
            m.insert(k, v);
        }
        m
    }

    fn eval_one(rule: &FormRule, raw: &Measurements, stage: &str) -> FormRuleResult {
        let smoothed = Measurements::new();
        rule.evaluate(&RuleContext {
            raw,
            smoothed: &smoothed,
            stage,
        })
    }

    #[test]
    fn test_range_of_motion_bands() {
        let rule = depth_rule();
        let r = eval_one(&rule, &measurements(&[("hip_drop", -0.08)]), "down");
        assert!(approx_eq(r.score_delta, 5.0));
        assert_eq!(r.message.as_deref(), Some("Excellent depth!"));

        let r = eval_one(&rule, &measurements(&[("hip_drop", -0.03)]), "down");
        assert!(approx_eq(r.score_delta, 0.0));
        assert_eq!(r.message.as_deref(), Some("Good depth!"));

        // good と shallow の間は無言
        let r = eval_one(&rule, &measurements(&[("hip_drop", 0.0)]), "down");
        assert_eq!(r, FormRuleResult::none("depth"));

        let r = eval_one(&rule, &measurements(&[("hip_drop", 0.1)]), "down");
        assert!(approx_eq(r.score_delta, -20.0));
    }

    #[test]
    fn test_range_of_motion_above_and_stage_gate() {
        let rule = FormRule::RangeOfMotion(RangeOfMotionRule {
            id: "raise".to_string(),
            measure: "shoulder".to_string(),
            direction: ActiveWhen::Above,
            excellent: 160.0,
            excellent_bonus: 0.0,
            excellent_message: None,
            good: 140.0,
            good_message: None,
            shallow: None,
            shallow_penalty: 10.0,
            shallow_message: Some("Raise higher".to_string()),
            when_stage: Some("up".to_string()),
            smoothed: false,
        });
        let m = measurements(&[("shoulder", 120.0)]);
        assert!(approx_eq(eval_one(&rule, &m, "up").score_delta, -10.0));
        assert_eq!(eval_one(&rule, &m, "down"), FormRuleResult::none("raise"));
        assert!(approx_eq(eval_one(&rule, &measurements(&[("shoulder", 150.0)]), "up").score_delta, 0.0));
    }

    #[test]
    fn test_alignment() {
        let rule = knees_rule();
        let r = eval_one(&rule, &measurements(&[("knee_width", 0.1), ("ankle_width", 0.2)]), "up");
        assert!(approx_eq(r.score_delta, -15.0));
        let r = eval_one(&rule, &measurements(&[("knee_width", 0.3), ("ankle_width", 0.2)]), "up");
        assert!(approx_eq(r.score_delta, -5.0));
        let r = eval_one(&rule, &measurements(&[("knee_width", 0.2), ("ankle_width", 0.2)]), "up");
        assert_eq!(r.message.as_deref(), Some("Good knee alignment!"));
        // 基準がほぼ 0 なら評価しない
        let r = eval_one(&rule, &measurements(&[("knee_width", 0.2), ("ankle_width", 0.0)]), "up");
        assert_eq!(r, FormRuleResult::none("knees"));
    }

    #[test]
    fn test_symmetry_and_posture() {
        let sym = FormRule::Symmetry(SymmetryRule {
            id: "even".to_string(),
            left: "l".to_string(),
            right: "r".to_string(),
            max_difference: 15.0,
            penalty: 8.0,
            message: "Keep body balanced".to_string(),
            ok_message: None,
            smoothed: false,
        });
        assert!(approx_eq(eval_one(&sym, &measurements(&[("l", 90.0), ("r", 120.0)]), "").score_delta, -8.0));
        assert_eq!(eval_one(&sym, &measurements(&[("l", 90.0), ("r", 100.0)]), "").message, None);

        let lean = FormRule::Posture(PostureRule {
            id: "lean".to_string(),
            measure: "lean".to_string(),
            min: None,
            max: Some(0.1),
            below_penalty: 0.0,
            below_message: None,
            above_penalty: 10.0,
            above_message: Some("Keep chest up".to_string()),
            ok_message: Some("Good posture!".to_string()),
            when_stage: None,
            smoothed: false,
        });
        assert!(approx_eq(eval_one(&lean, &measurements(&[("lean", 0.2)]), "").score_delta, -10.0));
        assert_eq!(
            eval_one(&lean, &measurements(&[("lean", 0.05)]), "").message.as_deref(),
            Some("Good posture!")
        );
    }

    #[test]
    fn test_missing_measure_is_silent() {
        for rule in [depth_rule(), knees_rule()] {
            let r = eval_one(&rule, &Measurements::new(), "down");
            assert_eq!(r.score_delta, 0.0);
            assert!(r.message.is_none());
        }
    }

    #[test]
    fn test_smoothed_falls_back_to_raw() {
        let mut rule = depth_rule();
        if let FormRule::RangeOfMotion(r) = &mut rule {
            r.smoothed = true;
        }
        let raw = measurements(&[("hip_drop", 0.1)]);
        let smoothed = measurements(&[("hip_drop", -0.1)]);
        let ctx = RuleContext {
            raw: &raw,
            smoothed: &smoothed,
            stage: "down",
        };
        assert!(approx_eq(rule.evaluate(&ctx).score_delta, 5.0));
        let empty = Measurements::new();
        let ctx = RuleContext {
            raw: &raw,
            smoothed: &empty,
            stage: "down",
        };
        assert!(approx_eq(rule.evaluate(&ctx).score_delta, -20.0));
    }

    #[test]
    fn test_score_clamped() {
        let harsh = FormRule::Posture(PostureRule {
            id: "harsh".to_string(),
            measure: "x".to_string(),
            min: Some(10.0),
            max: None,
            below_penalty: 500.0,
            below_message: None,
            above_penalty: 0.0,
            above_message: None,
            ok_message: None,
            when_stage: None,
            smoothed: false,
        });
        let raw = measurements(&[("x", 0.0), ("hip_drop", -1.0)]);
        let smoothed = Measurements::new();
        let ctx = RuleContext {
            raw: &raw,
            smoothed: &smoothed,
            stage: "down",
        };
        let low = evaluate(&[harsh], &default_headlines(), &ctx);
        assert_eq!(low.score, 0.0);
        assert_eq!(low.warnings[0], "Focus on form improvements");

        let high = evaluate(&[depth_rule()], &default_headlines(), &ctx);
        assert_eq!(high.score, 100.0);
        assert_eq!(high.warnings, vec!["Perfect form!", "Excellent depth!"]);
    }

    #[test]
    fn test_headline_bands() {
        let h = default_headlines();
        assert_eq!(headline_for(&h, 100.0), Some("Perfect form!"));
        assert_eq!(headline_for(&h, 90.0), Some("Perfect form!"));
        assert_eq!(headline_for(&h, 89.9), Some("Great form!"));
        assert_eq!(headline_for(&h, 80.0), Some("Great form!"));
        assert_eq!(headline_for(&h, 70.0), Some("Good form, minor adjustments needed"));
        assert_eq!(headline_for(&h, 0.0), Some("Focus on form improvements"));
        assert_eq!(headline_for(&[], 50.0), None);
    }

    #[test]
    fn test_rule_from_toml() {
        let rule: FormRule = toml::from_str(
            r#"
            kind = "posture"
            id = "lean"
            measure = "lean"
            max = 0.1
            above_penalty = 10.0
            above_message = "Keep chest up"
            "#,
        )
        .unwrap();
        assert_eq!(rule.id(), "lean");
        assert_eq!(rule.measures(), vec!["lean"]);
        assert!(rule.validate("squat").is_ok());
    }
}
