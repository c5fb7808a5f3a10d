use serde::{Deserialize, Serialize};
use std::fmt;

/// Handle to a variable inside a [`Formulation`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct VarId(pub usize);

impl VarId {
    pub fn index(&self) -> usize {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum VarKind {
    Binary,
    Continuous { lower: f64, upper: f64 },
}

/// `Σ coef·var + constant`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LinearExpr {
    pub terms: Vec<(VarId, f64)>,
    pub constant: f64,
}

impl LinearExpr {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(n: usize) -> Self {
        Self {
            terms: Vec::with_capacity(n),
            constant: 0.0,
        }
    }

    /// Add `coef·var`. Zero coefficients are dropped.
    pub fn add_term(&mut self, var: VarId, coef: f64) {
        if coef != 0.0 {
            self.terms.push((var, coef));
        }
    }

    pub fn add_constant(&mut self, value: f64) {
        self.constant += value;
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    /// Value under the given variable assignment. Variables outside
    /// `values` count as zero.
    pub fn evaluate(&self, values: &[f64]) -> f64 {
        self.constant
            + self
                .terms
                .iter()
                .map(|(v, c)| c * values.get(v.0).copied().unwrap_or(0.0))
                .sum::<f64>()
    }
}

impl FromIterator<(VarId, f64)> for LinearExpr {
    fn from_iter<T: IntoIterator<Item = (VarId, f64)>>(iter: T) -> Self {
        let mut expr = LinearExpr::new();
        for (var, coef) in iter {
            expr.add_term(var, coef);
        }
        expr
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Comparison {
    Le,
    Ge,
    Eq,
}

impl fmt::Display for Comparison {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let symbol = match self {
            Comparison::Le => "<=",
            Comparison::Ge => ">=",
            Comparison::Eq => "=",
        };
        write!(f, "{}", symbol)
    }
}

/// `expr (<=|>=|=) rhs`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Constraint {
    pub name: String,
    pub expr: LinearExpr,
    pub comparison: Comparison,
    pub rhs: f64,
}

impl Constraint {
    pub fn le(name: impl Into<String>, expr: LinearExpr, rhs: f64) -> Self {
        Self::new(name, expr, Comparison::Le, rhs)
    }

    pub fn ge(name: impl Into<String>, expr: LinearExpr, rhs: f64) -> Self {
        Self::new(name, expr, Comparison::Ge, rhs)
    }

    pub fn new(name: impl Into<String>, expr: LinearExpr, comparison: Comparison, rhs: f64) -> Self {
        Self {
            name: name.into(),
            expr,
            comparison,
            rhs,
        }
    }

    pub fn is_satisfied(&self, values: &[f64], tolerance: f64) -> bool {
        let lhs = self.expr.evaluate(values);
        match self.comparison {
            Comparison::Le => lhs <= self.rhs + tolerance,
            Comparison::Ge => lhs >= self.rhs - tolerance,
            Comparison::Eq => (lhs - self.rhs).abs() <= tolerance,
        }
    }
}

/// Direction of optimization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Sense {
    Max,
    Min,
}

impl Sense {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "max" | "maximize" | "maximise" => Some(Sense::Max),
            "min" | "minimize" | "minimise" => Some(Sense::Min),
            _ => None,
        }
    }
}

impl fmt::Display for Sense {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Sense::Max => write!(f, "Max"),
            Sense::Min => write!(f, "Min"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Objective {
    pub sense: Sense,
    pub expr: LinearExpr,
}

/// A complete mixed-integer linear program, independent of any solver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Formulation {
    variables: Vec<VarKind>,
    constraints: Vec<Constraint>,
    objective: Objective,
}

impl Formulation {
    pub fn new(sense: Sense) -> Self {
        Self {
            variables: Vec::new(),
            constraints: Vec::new(),
            objective: Objective {
                sense,
                expr: LinearExpr::new(),
            },
        }
    }

    pub fn add_variable(&mut self, kind: VarKind) -> VarId {
        self.variables.push(kind);
        VarId(self.variables.len() - 1)
    }

    pub fn add_binary(&mut self) -> VarId {
        self.add_variable(VarKind::Binary)
    }

    pub fn add_constraint(&mut self, constraint: Constraint) {
        self.constraints.push(constraint);
    }

    pub fn set_objective(&mut self, expr: LinearExpr) {
        self.objective.expr = expr;
    }

    pub fn variables(&self) -> &[VarKind] {
        &self.variables
    }

    pub fn constraints(&self) -> &[Constraint] {
        &self.constraints
    }

    pub fn objective(&self) -> &Objective {
        &self.objective
    }

    pub fn num_variables(&self) -> usize {
        self.variables.len()
    }

    pub fn num_constraints(&self) -> usize {
        self.constraints.len()
    }

    /// Whether `values` respects every bound and constraint.
    pub fn is_feasible(&self, values: &[f64], tolerance: f64) -> bool {
        if values.len() != self.variables.len() {
            return false;
        }
        let bounds_ok = self.variables.iter().zip(values).all(|(kind, &v)| match kind {
            VarKind::Binary => v.abs() <= tolerance || (v - 1.0).abs() <= tolerance,
            VarKind::Continuous { lower, upper } => v >= lower - tolerance && v <= upper + tolerance,
        });
        bounds_ok && self.constraints.iter().all(|c| c.is_satisfied(values, tolerance))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_expression_evaluation() {
        let expr: LinearExpr = vec![(VarId(0), 2.0), (VarId(2), -1.5), (VarId(1), 0.0)]
            .into_iter()
            .collect();
        assert_eq!(expr.terms.len(), 2);
        assert_relative_eq!(expr.evaluate(&[1.0, 5.0, 2.0]), -1.0);
    }

    #[test]
    fn test_constraint_satisfaction() {
        let mut expr = LinearExpr::new();
        expr.add_term(VarId(0), 1.0);
        expr.add_term(VarId(1), 1.0);
        let le = Constraint::le("cap", expr.clone(), 1.0);
        assert!(le.is_satisfied(&[1.0, 0.0], 1e-9));
        assert!(!le.is_satisfied(&[1.0, 1.0], 1e-9));
        let ge = Constraint::ge("floor", expr, 2.0);
        assert!(ge.is_satisfied(&[1.0, 1.0], 1e-9));
    }

    #[test]
    fn test_feasibility_checks_bounds() {
        let mut f = Formulation::new(Sense::Max);
        let x = f.add_binary();
        let y = f.add_variable(VarKind::Continuous { lower: 0.0, upper: 3.0 });
        f.add_constraint(Constraint::le("sum", [(x, 1.0), (y, 1.0)].into_iter().collect(), 2.5));
        assert!(f.is_feasible(&[1.0, 1.5], 1e-9));
        assert!(!f.is_feasible(&[0.5, 1.0], 1e-9));
        assert!(!f.is_feasible(&[1.0, 2.0], 1e-9));
        assert!(!f.is_feasible(&[1.0], 1e-9));
    }

    #[test]
    fn test_sense_parsing() {
        assert_eq!(Sense::parse("Max"), Some(Sense::Max));
        assert_eq!(Sense::parse(" min "), Some(Sense::Min));
        assert_eq!(Sense::parse("sideways"), None);
    }
}
