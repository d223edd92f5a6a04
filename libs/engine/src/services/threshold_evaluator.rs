// [libs/engine/src/services/threshold_evaluator.rs]
//! =================================================================
//! APARATO: THRESHOLD EVALUATOR (C3) (V1.0)
//! CLASIFICACIÓN: DOMAIN SERVICE (ESTRATO L2)
//! RESPONSABILIDAD: APERTURA Y RESOLUCIÓN DE INCIDENTES BREACH
//!
//! Se dispara tras persistir un lote de muestras de una máquina. Por
//! cada umbral activo de cada métrica de la máquina, relee la muestra
//! más fresca y evalúa la condición contra el tipo declarado de la
//! métrica — nunca contra el tipo que trae la muestra.
//! =================================================================

use crate::errors::EngineError;
use crate::services::{NotificationRequest, NotificationSender};
use monitor_db::repositories::incidents::{dedup_key_for, NewIncident};
use monitor_db::repositories::{IncidentRepository, MetricRepository, ThresholdRepository};
use monitor_domain::incident::{IncidentKind, Severity};
use monitor_domain::metric::{Condition, MetricType, Sample, Threshold, ThresholdSeverity};
use regex::Regex;
use tracing::{instrument, warn};

pub struct ThresholdEvaluator {
    metrics: MetricRepository,
    thresholds: ThresholdRepository,
    incidents: IncidentRepository,
    notifications: NotificationSender,
}

impl ThresholdEvaluator {
    pub fn new(
        metrics: MetricRepository,
        thresholds: ThresholdRepository,
        incidents: IncidentRepository,
        notifications: NotificationSender,
    ) -> Self {
        Self { metrics, thresholds, incidents, notifications }
    }

    /// Evalúa todos los umbrales activos de una instancia de métrica
    /// contra su muestra más fresca. Llamado por el handler de ingesta
    /// tras confirmar la escritura de un lote de muestras.
    #[instrument(skip(self), fields(metric_instance_id = %metric_instance_id))]
    pub async fn evaluate_metric(&self, tenant_id: &str, metric_instance_id: &str) -> Result<(), EngineError> {
        let Some(instance) = self.metrics.find_instance_by_id(metric_instance_id).await? else {
            warn!("metric instance vanished before evaluation");
            return Ok(());
        };

        let Some(sample) = self.metrics.latest_sample(metric_instance_id).await? else {
            return Ok(());
        };

        let active_thresholds = self.thresholds.list_active_for_metric(metric_instance_id).await?;
        for threshold in active_thresholds {
            self.evaluate_one(tenant_id, &instance.metric_type, &sample, &threshold).await?;
        }
        Ok(())
    }

    async fn evaluate_one(
        &self,
        tenant_id: &str,
        metric_type: &MetricType,
        sample: &Sample,
        threshold: &Threshold,
    ) -> Result<(), EngineError> {
        let breached = matches_condition(metric_type, sample, threshold);
        let dedup_key = dedup_key_for(IncidentKind::Breach, &threshold.metric_instance_id);

        if breached {
            let outcome = self
                .incidents
                .open(NewIncident {
                    tenant_id,
                    kind: IncidentKind::Breach,
                    scope_id: &threshold.metric_instance_id,
                    title: format!("threshold breach on metric {}", threshold.metric_instance_id),
                    description: Some(describe_sample(sample)),
                    severity: to_incident_severity(threshold.severity),
                    machine_id: None,
                    metric_instance_id: Some(&threshold.metric_instance_id),
                    http_target_id: None,
                })
                .await?;

            if outcome.created && matches!(threshold.severity, ThresholdSeverity::Warning | ThresholdSeverity::Critical) {
                let request = NotificationRequest::new(
                    tenant_id,
                    Some(outcome.incident.id.clone()),
                    outcome.incident.severity,
                    outcome.incident.title.clone(),
                    format!("{} — {}", outcome.incident.title, describe_sample(sample)),
                    false,
                );
                let _ = self.notifications.send(request).await;
            }
        } else {
            self.incidents.resolve_open_by_dedup_key(tenant_id, &dedup_key).await?;
        }
        Ok(())
    }
}

fn to_incident_severity(severity: ThresholdSeverity) -> Severity {
    match severity {
        ThresholdSeverity::Info => Severity::Info,
        ThresholdSeverity::Warning => Severity::Warning,
        ThresholdSeverity::Critical => Severity::Critical,
    }
}

fn describe_sample(sample: &Sample) -> String {
    if let Some(v) = sample.value_numeric {
        format!("current_value={v}")
    } else if let Some(v) = sample.value_bool {
        format!("current_value={v}")
    } else if let Some(v) = &sample.value_string {
        format!("current_value={v}")
    } else {
        "current_value=<none>".to_string()
    }
}

/// Evalúa la condición del umbral contra la muestra, interpretando el
/// valor según el tipo declarado de la métrica (no el que trae la
/// muestra). Un valor ausente o de tipo equivocado nunca produce un
/// incumplimiento — sólo un no-match silencioso.
fn matches_condition(metric_type: &MetricType, sample: &Sample, threshold: &Threshold) -> bool {
    match metric_type {
        MetricType::Numeric => match (sample.value_numeric, threshold.value_num) {
            (Some(value), Some(target)) => match threshold.condition {
                Condition::Gt => value > target,
                Condition::Ge => value >= target,
                Condition::Lt => value < target,
                Condition::Le => value <= target,
                Condition::Eq => (value - target).abs() < f64::EPSILON,
                Condition::Ne => (value - target).abs() >= f64::EPSILON,
                _ => false,
            },
            _ => false,
        },
        MetricType::Boolean => match (sample.value_bool, threshold.value_bool) {
            (Some(value), Some(target)) => match threshold.condition {
                Condition::Eq => value == target,
                Condition::Ne => value != target,
                _ => false,
            },
            _ => false,
        },
        MetricType::String => match (&sample.value_string, &threshold.value_str) {
            (Some(value), Some(target)) => match threshold.condition {
                Condition::Eq => value == target,
                Condition::Ne => value != target,
                Condition::Contains => value.contains(target.as_str()),
                Condition::NotContains => !value.contains(target.as_str()),
                Condition::Regex => Regex::new(target).map(|re| re.is_match(value)).unwrap_or(false),
                _ => false,
            },
            _ => false,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn threshold(condition: Condition) -> Threshold {
        Threshold {
            id: "th1".into(),
            tenant_id: "tenant1".into(),
            metric_instance_id: "mi1".into(),
            condition,
            value_num: None,
            value_bool: None,
            value_str: None,
            severity: ThresholdSeverity::Warning,
            is_active: true,
            consecutive_breaches: 1,
            min_duration_sec: 0,
            cooldown_sec: 0,
            created_at: chrono::Utc::now(),
        }
    }

    fn numeric_sample(value: f64) -> Sample {
        Sample {
            id: "s1".into(),
            metric_instance_id: "mi1".into(),
            value_numeric: Some(value),
            value_bool: None,
            value_string: None,
            ts: chrono::Utc::now(),
            seq: 0,
        }
    }

    fn bool_sample(value: bool) -> Sample {
        Sample {
            id: "s1".into(),
            metric_instance_id: "mi1".into(),
            value_numeric: None,
            value_bool: Some(value),
            value_string: None,
            ts: chrono::Utc::now(),
            seq: 0,
        }
    }

    fn string_sample(value: &str) -> Sample {
        Sample {
            id: "s1".into(),
            metric_instance_id: "mi1".into(),
            value_numeric: None,
            value_bool: None,
            value_string: Some(value.to_string()),
            ts: chrono::Utc::now(),
            seq: 0,
        }
    }

    #[test]
    fn numeric_gt_breaches_above_threshold() {
        let mut th = threshold(Condition::Gt);
        th.value_num = Some(1.0);
        assert!(matches_condition(&MetricType::Numeric, &numeric_sample(3.3), &th));
        assert!(!matches_condition(&MetricType::Numeric, &numeric_sample(0.2), &th));
    }

    #[test]
    fn numeric_condition_ignores_non_numeric_sample() {
        let mut th = threshold(Condition::Gt);
        th.value_num = Some(1.0);
        // sample carries a string value even though metric type is numeric
        assert!(!matches_condition(&MetricType::Numeric, &string_sample("3.3"), &th));
    }

    #[test]
    fn missing_threshold_value_never_breaches() {
        let th = threshold(Condition::Gt); // value_num left None
        assert!(!matches_condition(&MetricType::Numeric, &numeric_sample(100.0), &th));
    }

    #[test]
    fn boolean_eq_and_ne() {
        let mut eq = threshold(Condition::Eq);
        eq.value_bool = Some(true);
        assert!(matches_condition(&MetricType::Boolean, &bool_sample(true), &eq));
        assert!(!matches_condition(&MetricType::Boolean, &bool_sample(false), &eq));

        let mut ne = threshold(Condition::Ne);
        ne.value_bool = Some(true);
        assert!(matches_condition(&MetricType::Boolean, &bool_sample(false), &ne));
    }

    #[test]
    fn string_contains_and_regex() {
        let mut contains = threshold(Condition::Contains);
        contains.value_str = Some("error".into());
        assert!(matches_condition(&MetricType::String, &string_sample("fatal error occurred"), &contains));
        assert!(!matches_condition(&MetricType::String, &string_sample("all good"), &contains));

        let mut regex = threshold(Condition::Regex);
        regex.value_str = Some(r"^5\d\d$".into());
        assert!(matches_condition(&MetricType::String, &string_sample("503"), &regex));
        assert!(!matches_condition(&MetricType::String, &string_sample("200"), &regex));
    }

    #[test]
    fn invalid_regex_is_a_silent_non_match() {
        let mut regex = threshold(Condition::Regex);
        regex.value_str = Some("(unclosed".into());
        assert!(!matches_condition(&MetricType::String, &string_sample("anything"), &regex));
    }
}
