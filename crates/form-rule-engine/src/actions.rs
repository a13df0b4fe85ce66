//! 动作应用
//!
//! 每个动作把派生状态累加器变换为新的累加器，除此之外没有任何副作用。

use crate::formula::Formula;
use crate::models::{Action, DerivedState, EvaluationContext, FORM_SCOPE};
use crate::template::TargetCatalog;
use crate::warnings::Warning;
use serde_json::{Number, Value};

/// 动作应用器
///
/// 提供目录时会校验目标是否存在，并按字段类型/精度处理 `clearValue` 与 `calculate`。
#[derive(Debug, Clone, Copy, Default)]
pub struct ActionApplier<'a> {
    catalog: Option<&'a TargetCatalog>,
}

impl<'a> ActionApplier<'a> {
    pub fn new(catalog: Option<&'a TargetCatalog>) -> Self {
        Self { catalog }
    }

    /// 应用单个动作，返回新的派生状态
    ///
    /// 目标不存在或公式无法求值时记录告警，状态原样返回。
    pub fn apply(
        &self,
        action: &Action,
        context: &EvaluationContext,
        mut state: DerivedState,
        rule_id: &str,
        warnings: &mut Vec<Warning>,
    ) -> DerivedState {
        let target = action.target().unwrap_or(FORM_SCOPE);

        if let Some(catalog) = self.catalog {
            if !catalog.contains(target) {
                warnings.push(Warning::UnknownTarget {
                    rule_id: rule_id.to_string(),
                    action: action.action_type(),
                    target: target.to_string(),
                });
                return state;
            }
        }

        match action {
            Action::Show { .. } => state.entry_mut(target).visible = true,
            Action::Hide { .. } => state.entry_mut(target).visible = false,
            Action::Enable { .. } => state.entry_mut(target).enabled = true,
            Action::Disable { .. } => state.entry_mut(target).enabled = false,
            Action::Require { .. } => state.entry_mut(target).required = true,
            Action::Optional { .. } => state.entry_mut(target).required = false,
            Action::SetValue { value, .. } => state.entry_mut(target).value = Some(value.clone()),
            Action::ClearValue { .. } => {
                let empty = self
                    .catalog
                    .map(|c| c.empty_value_for(target))
                    .unwrap_or(Value::Null);
                state.entry_mut(target).value = Some(empty);
            }
            Action::Calculate { formula, .. } => {
                match self.calculate(formula, target, context) {
                    Ok(value) => state.entry_mut(target).value = Some(value),
                    Err(reason) => warnings.push(Warning::FormulaError {
                        rule_id: rule_id.to_string(),
                        target: target.to_string(),
                        reason,
                    }),
                }
            }
            Action::ShowAlert { message, .. } | Action::ShowWarning { message, .. } => {
                state.entry_mut(target).errors.push(message.clone());
            }
        }

        state
    }

    fn calculate(
        &self,
        formula: &str,
        target: &str,
        context: &EvaluationContext,
    ) -> std::result::Result<Value, String> {
        let result = Formula::parse(formula)
            .and_then(|f| f.evaluate(context))
            .map_err(|e| e.to_string())?;

        let rounded = match self.catalog.and_then(|c| c.precision(target)) {
            Some(precision) => round_to(result, precision),
            None => result,
        };

        Number::from_f64(rounded)
            .map(Value::Number)
            .ok_or_else(|| format!("结果 {} 无法表示为 JSON 数值", rounded))
    }
}

/// 四舍五入到指定小数位
fn round_to(value: f64, precision: u32) -> f64 {
    let factor = 10f64.powi(precision.min(15) as i32);
    (value * factor).round() / factor
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ActionType;
    use crate::template::{FieldDef, FieldType, FormTemplate, SectionDef};
    use serde_json::json;

    fn catalog() -> TargetCatalog {
        FormTemplate::new("intake", "Intake")
            .with_section(SectionDef::new("vitals", "Vitals"))
            .with_field(FieldDef::new("weight", FieldType::Number))
            .with_field(FieldDef::new("height", FieldType::Number))
            .with_field(FieldDef::new("bmi", FieldType::Number).with_precision(1))
            .with_field(FieldDef::new("notes", FieldType::Textarea))
            .with_field(FieldDef::new("allergies", FieldType::MultiSelect))
            .with_field(FieldDef::new("smoker", FieldType::Checkbox))
            .catalog()
    }

    fn apply_all(applier: ActionApplier<'_>, actions: &[Action], ctx: &EvaluationContext) -> (DerivedState, Vec<Warning>) {
        let mut warnings = Vec::new();
        let state = actions.iter().fold(DerivedState::new(), |state, action| {
            applier.apply(action, ctx, state, "r1", &mut warnings)
        });
        (state, warnings)
    }

    #[test]
    fn test_flag_actions() {
        let catalog = catalog();
        let actions = vec![
            Action::Hide { target: "vitals".into() },
            Action::Disable { target: "notes".into() },
            Action::Require { target: "weight".into() },
            Action::Require { target: "height".into() },
            Action::Optional { target: "height".into() },
        ];

        let (state, warnings) = apply_all(ActionApplier::new(Some(&catalog)), &actions, &EvaluationContext::default());
        assert!(warnings.is_empty());
        assert!(!state.is_visible("vitals"));
        assert!(!state.is_enabled("notes"));
        assert!(state.is_required("weight"));
        assert!(!state.is_required("height"));
    }

    #[test]
    fn test_clear_value_uses_field_type_default() {
        let catalog = catalog();
        let actions = vec![
            Action::ClearValue { target: "notes".into() },
            Action::ClearValue { target: "allergies".into() },
            Action::ClearValue { target: "smoker".into() },
            Action::ClearValue { target: "weight".into() },
        ];

        let (state, _) = apply_all(ActionApplier::new(Some(&catalog)), &actions, &EvaluationContext::default());
        assert_eq!(state.value("notes"), Some(&json!("")));
        assert_eq!(state.value("allergies"), Some(&json!([])));
        assert_eq!(state.value("smoker"), Some(&json!(false)));
        assert_eq!(state.value("weight"), Some(&Value::Null));
    }

    #[test]
    fn test_calculate_rounds_to_precision() {
        let catalog = catalog();
        let ctx = EvaluationContext::new(json!({"weight": 70, "height": 175}));
        let actions = vec![Action::Calculate {
            target: "bmi".into(),
            formula: "{weight} / ({height} / 100) ^ 2".into(),
        }];

        let (state, warnings) = apply_all(ActionApplier::new(Some(&catalog)), &actions, &ctx);
        assert!(warnings.is_empty());
        assert_eq!(state.value("bmi"), Some(&json!(22.9)));

        let (state, _) = apply_all(ActionApplier::default(), &actions, &ctx);
        let unrounded = state.value("bmi").and_then(Value::as_f64).unwrap();
        assert!((unrounded - 22.857142857142858).abs() < 1e-9);
    }

    #[test]
    fn test_calculate_failure_leaves_value_untouched() {
        let catalog = catalog();
        let ctx = EvaluationContext::new(json!({"weight": 70, "height": 0}));
        let actions = vec![
            Action::SetValue { target: "bmi".into(), value: json!(20) },
            Action::Calculate { target: "bmi".into(), formula: "{weight} / {height}".into() },
        ];

        let (state, warnings) = apply_all(ActionApplier::new(Some(&catalog)), &actions, &ctx);
        assert_eq!(state.value("bmi"), Some(&json!(20)));
        assert!(matches!(warnings.as_slice(), [Warning::FormulaError { target, .. }] if target == "bmi"));
    }

    #[test]
    fn test_unknown_target_is_skipped_with_warning() {
        let catalog = catalog();
        let actions = vec![Action::Show { target: "ghost".into() }];

        let (state, warnings) = apply_all(ActionApplier::new(Some(&catalog)), &actions, &EvaluationContext::default());
        assert!(state.is_empty());
        assert_eq!(
            warnings,
            vec![Warning::UnknownTarget {
                rule_id: "r1".into(),
                action: ActionType::Show,
                target: "ghost".into(),
            }]
        );
    }

    #[test]
    fn test_alerts_append_without_touching_visibility() {
        let catalog = catalog();
        let actions = vec![
            Action::Hide { target: "vitals".into() },
            Action::ShowAlert { target: Some("vitals".into()), message: "心动过速".into() },
            Action::ShowWarning { target: Some("vitals".into()), message: "复测心率".into() },
            Action::ShowAlert { target: None, message: "请核对过敏史".into() },
        ];

        let (state, warnings) = apply_all(ActionApplier::new(Some(&catalog)), &actions, &EvaluationContext::default());
        assert!(warnings.is_empty());
        assert!(!state.is_visible("vitals"));
        assert_eq!(state.errors("vitals"), ["心动过速".to_string(), "复测心率".to_string()]);
        assert_eq!(state.errors(FORM_SCOPE), ["请核对过敏史".to_string()]);
    }
}
