// libs/domain/models/src/metric.rs
//! Métricas reportadas por una máquina, sus últimas muestras y los
//! umbrales que disparan incidentes cuando se incumplen.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Tipo de dato que transporta una métrica, usado para validar el umbral.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricType {
    Numeric,
    Boolean,
    String,
}

/// Una serie con nombre reportada por una máquina (ej: "cpu.load", "disk.root.free_pct").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricInstance {
    pub id: String,
    pub tenant_id: String,
    pub machine_id: String,
    pub metric_name: String,
    pub metric_type: MetricType,
    /// Si es falso, la métrica nunca participa en evaluación de umbral ni
    /// en el escaneo de frescura, aunque siga recibiendo muestras.
    pub is_alerting_enabled: bool,
    /// Pausa manual: excluye la métrica del escaneo de frescura sin
    /// deshabilitar la alerta de forma permanente.
    pub is_paused: bool,
    pub created_at: DateTime<Utc>,
    /// Última vez que se escribió una muestra para esta instancia.
    /// Invariante: monotónico para una misma instancia.
    pub updated_at: DateTime<Utc>,
}

impl MetricInstance {
    /// Una métrica candidata al escaneo de frescura: alertable y no pausada.
    pub fn is_freshness_candidate(&self) -> bool {
        self.is_alerting_enabled && !self.is_paused
    }
}

/// Una lectura puntual de una `MetricInstance`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Sample {
    pub id: String,
    pub metric_instance_id: String,
    /// Valor numérico si `metric_type == Numeric`.
    pub value_numeric: Option<f64>,
    /// Valor booleano si `metric_type == Boolean`.
    pub value_bool: Option<bool>,
    /// Valor de texto si `metric_type == String`.
    pub value_string: Option<String>,
    /// Marca de tiempo de la muestra según la fuente que la reportó.
    pub ts: DateTime<Utc>,
    /// Secuencia monotónica de desempate para muestras con el mismo `ts`.
    pub seq: i64,
}

/// Operador de comparación de un umbral contra el valor de una muestra.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Condition {
    Gt,
    Ge,
    Lt,
    Le,
    Eq,
    Ne,
    Contains,
    NotContains,
    Regex,
}

/// Severidad asignada al incidente que abre un umbral incumplido.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThresholdSeverity {
    Info,
    Warning,
    Critical,
}

/// Regla de alerta para una `MetricInstance`: si la condición se cumple,
/// se abre un incidente de tipo `Breach`. El lado derecho de la
/// comparación se guarda tipado — sólo una de las tres columnas se llena,
/// según el `MetricType` de la métrica asociada — en lugar de un texto
/// genérico, para que una comparación contra el tipo equivocado sea
/// estáticamente `None` en vez de un parseo fallido en tiempo de evaluación.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Threshold {
    pub id: String,
    pub tenant_id: String,
    pub metric_instance_id: String,
    pub condition: Condition,
    pub value_num: Option<f64>,
    pub value_bool: Option<bool>,
    pub value_str: Option<String>,
    pub severity: ThresholdSeverity,
    pub is_active: bool,
    /// Número de incumplimientos consecutivos requeridos antes de abrir el
    /// incidente. Campo consultivo: ver DESIGN.md.
    pub consecutive_breaches: i32,
    /// Duración mínima en segundos que la condición debe sostenerse.
    /// Campo consultivo: ver DESIGN.md.
    pub min_duration_sec: i32,
    /// Cooldown propio del umbral entre recordatorios. Ver DESIGN.md para
    /// la decisión de precedencia frente al cooldown de `TenantSettings`.
    pub cooldown_sec: i64,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn instance(is_alerting_enabled: bool, is_paused: bool) -> MetricInstance {
        MetricInstance {
            id: "mi1".into(),
            tenant_id: "tenant1".into(),
            machine_id: "m1".into(),
            metric_name: "cpu.load".into(),
            metric_type: MetricType::Numeric,
            is_alerting_enabled,
            is_paused,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn candidate_requires_alerting_enabled_and_not_paused() {
        assert!(instance(true, false).is_freshness_candidate());
        assert!(!instance(false, false).is_freshness_candidate());
        assert!(!instance(true, true).is_freshness_candidate());
        assert!(!instance(false, true).is_freshness_candidate());
    }
}
