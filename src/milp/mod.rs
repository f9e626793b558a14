//! A solver-agnostic mixed-integer linear program.
//!
//! The model builder assembles a [`Milp`]; any [`MilpSolver`] backend turns it into
//! a [`RawSolution`]. Every constraint carries a stable name so that an infeasible
//! model can be inspected by name, for example through the LP rendering given by
//! the `Display` implementation.

use std::collections::HashSet;
use std::fmt;
use std::ops::{Add, Mul, Sub};

use derive_more::{Deref, From, Into};
use log::warn;
use typed_index_collections::{TiSlice, TiVec};

pub mod microlp;
pub mod solver;

#[cfg(feature = "gurobi")]
pub mod gurobi;

pub use solver::{Backend, MilpSolver, RawSolution, SolveStatus, SolverConfig, SolverError};

#[derive(Deref, Debug, PartialEq, Eq, PartialOrd, Ord, From, Into, Clone, Copy, Hash)]
pub struct VarId(usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VarKind {
    Binary,
    Integer,
    Continuous,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VarDef {
    pub name: String,
    pub kind: VarKind,
    pub lower: f64,
    pub upper: f64,
}

/// A linear expression `sum(coeff * var) + constant`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LinExpr {
    terms: Vec<(VarId, f64)>,
    constant: f64,
}

impl LinExpr {
    pub fn new() -> LinExpr {
        LinExpr::default()
    }

    pub fn add_term(&mut self, coeff: f64, var: VarId) -> &mut Self {
        self.terms.push((var, coeff));
        self
    }

    pub fn add_constant(&mut self, constant: f64) -> &mut Self {
        self.constant += constant;
        self
    }

    pub fn terms(&self) -> &[(VarId, f64)] {
        &self.terms
    }

    pub fn constant(&self) -> f64 {
        self.constant
    }

    /// Whether the expression references no variable at all
    pub fn is_constant(&self) -> bool {
        self.terms.is_empty()
    }

    /// Evaluates the expression for the given variable values
    pub fn eval(&self, values: &TiSlice<VarId, f64>) -> f64 {
        self.terms
            .iter()
            .map(|(var, coeff)| coeff * values[*var])
            .sum::<f64>()
            + self.constant
    }

    pub fn leq(self, rhs: impl Into<LinExpr>) -> ConstrBody {
        ConstrBody::new(self, Sense::Le, rhs.into())
    }

    pub fn geq(self, rhs: impl Into<LinExpr>) -> ConstrBody {
        ConstrBody::new(self, Sense::Ge, rhs.into())
    }

    pub fn equals(self, rhs: impl Into<LinExpr>) -> ConstrBody {
        ConstrBody::new(self, Sense::Eq, rhs.into())
    }
}

impl From<VarId> for LinExpr {
    fn from(var: VarId) -> Self {
        LinExpr {
            terms: vec![(var, 1.0)],
            constant: 0.0,
        }
    }
}

impl From<f64> for LinExpr {
    fn from(constant: f64) -> Self {
        LinExpr {
            terms: Vec::new(),
            constant,
        }
    }
}

impl FromIterator<VarId> for LinExpr {
    fn from_iter<T: IntoIterator<Item = VarId>>(iter: T) -> Self {
        iter.into_iter().map(|var| (1.0, var)).collect()
    }
}

impl FromIterator<(f64, VarId)> for LinExpr {
    fn from_iter<T: IntoIterator<Item = (f64, VarId)>>(iter: T) -> Self {
        LinExpr {
            terms: iter.into_iter().map(|(coeff, var)| (var, coeff)).collect(),
            constant: 0.0,
        }
    }
}

impl Add for LinExpr {
    type Output = LinExpr;

    fn add(mut self, rhs: LinExpr) -> LinExpr {
        self.terms.extend(rhs.terms);
        self.constant += rhs.constant;
        self
    }
}

impl Sub for LinExpr {
    type Output = LinExpr;

    fn sub(self, rhs: LinExpr) -> LinExpr {
        self + rhs * -1.0
    }
}

impl Mul<f64> for LinExpr {
    type Output = LinExpr;

    fn mul(mut self, rhs: f64) -> LinExpr {
        for (_, coeff) in &mut self.terms {
            *coeff *= rhs;
        }
        self.constant *= rhs;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sense {
    Le,
    Eq,
    Ge,
}

impl fmt::Display for Sense {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Sense::Le => write!(f, "<="),
            Sense::Eq => write!(f, "="),
            Sense::Ge => write!(f, ">="),
        }
    }
}

/// The body of a constraint, normalised to `lhs (sense) rhs` with every variable on the left
#[derive(Debug, Clone, PartialEq)]
pub struct ConstrBody {
    lhs: LinExpr,
    sense: Sense,
    rhs: f64,
}

impl ConstrBody {
    fn new(lhs: LinExpr, sense: Sense, rhs: LinExpr) -> ConstrBody {
        let mut lhs = lhs - rhs;
        let rhs = -lhs.constant;
        lhs.constant = 0.0;
        ConstrBody { lhs, sense, rhs }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Constraint {
    name: String,
    body: ConstrBody,
}

impl Constraint {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn lhs(&self) -> &LinExpr {
        &self.body.lhs
    }

    pub fn sense(&self) -> Sense {
        self.body.sense
    }

    pub fn rhs(&self) -> f64 {
        self.body.rhs
    }

    /// Whether the constraint holds for the given values, up to `tolerance`
    pub fn is_satisfied(&self, values: &TiSlice<VarId, f64>, tolerance: f64) -> bool {
        let lhs = self.lhs().eval(values);
        match self.sense() {
            Sense::Le => lhs <= self.rhs() + tolerance,
            Sense::Eq => (lhs - self.rhs()).abs() <= tolerance,
            Sense::Ge => lhs >= self.rhs() - tolerance,
        }
    }
}

/// A minimisation MILP with named variables and constraints
#[derive(Debug, Clone, PartialEq)]
pub struct Milp {
    name: String,
    vars: TiVec<VarId, VarDef>,
    objective: LinExpr,
    constraints: Vec<Constraint>,
    var_names: HashSet<String>,
    constr_names: HashSet<String>,
    collisions: Vec<String>,
}

impl Milp {
    pub fn new(name: &str) -> Milp {
        Milp {
            name: sanitize(name),
            vars: TiVec::new(),
            objective: LinExpr::new(),
            constraints: Vec::new(),
            var_names: HashSet::new(),
            constr_names: HashSet::new(),
            collisions: Vec::new(),
        }
    }

    /// Sanitizes `name` and records it when an earlier variable or constraint already took it
    fn claim(names: &mut HashSet<String>, collisions: &mut Vec<String>, name: &str) -> String {
        let sanitized = sanitize(name);
        if !names.insert(sanitized.clone()) {
            warn!("{} is sanitized to {}, which is already taken", name, sanitized);
            collisions.push(sanitized.clone());
        }
        sanitized
    }

    pub fn add_var(&mut self, name: &str, kind: VarKind, lower: f64, upper: f64) -> VarId {
        let (lower, upper) = match kind {
            VarKind::Binary => (0.0, 1.0),
            _ => (lower, upper),
        };
        let id = VarId(self.vars.len());
        self.vars.push(VarDef {
            name: Self::claim(&mut self.var_names, &mut self.collisions, name),
            kind,
            lower,
            upper,
        });
        id
    }

    pub fn add_constr(&mut self, name: &str, body: ConstrBody) {
        self.constraints.push(Constraint {
            name: Self::claim(&mut self.constr_names, &mut self.collisions, name),
            body,
        });
    }

    pub fn set_objective(&mut self, objective: LinExpr) {
        self.objective = objective;
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn vars(&self) -> &TiVec<VarId, VarDef> {
        &self.vars
    }

    pub fn var(&self, var: VarId) -> &VarDef {
        &self.vars[var]
    }

    pub fn objective(&self) -> &LinExpr {
        &self.objective
    }

    pub fn constraints(&self) -> &[Constraint] {
        &self.constraints
    }

    /// Names given to more than one variable, or to more than one constraint
    pub fn collisions(&self) -> &[String] {
        &self.collisions
    }

    /// Looks up a constraint by its name
    pub fn constraint(&self, name: &str) -> Option<&Constraint> {
        self.constraints.iter().find(|c| c.name == name)
    }

    /// Names of the constraints violated by `values`
    pub fn violated(&self, values: &TiSlice<VarId, f64>, tolerance: f64) -> Vec<&str> {
        self.constraints
            .iter()
            .filter(|c| !c.is_satisfied(values, tolerance))
            .map(|c| c.name())
            .collect()
    }
}

/// Restricts a name to characters accepted by LP-format readers
pub fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '.' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

impl Milp {
    fn fmt_expr(&self, f: &mut fmt::Formatter<'_>, expr: &LinExpr) -> fmt::Result {
        if expr.terms.is_empty() {
            return write!(f, " 0 {}", self.vars.first().map_or("", |v| v.name.as_str()));
        }
        for (var, coeff) in &expr.terms {
            let sign = if *coeff < 0.0 { '-' } else { '+' };
            write!(f, " {} {} {}", sign, coeff.abs(), self.vars[*var].name)?;
        }
        Ok(())
    }
}

/// Renders the model in CPLEX LP format
impl fmt::Display for Milp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "\\ {}", self.name)?;
        writeln!(f, "Minimize")?;
        write!(f, " obj:")?;
        self.fmt_expr(f, &self.objective)?;
        if self.objective.constant != 0.0 {
            write!(f, " + {}", self.objective.constant)?;
        }
        writeln!(f)?;

        writeln!(f, "Subject To")?;
        for c in &self.constraints {
            write!(f, " {}:", c.name)?;
            self.fmt_expr(f, c.lhs())?;
            writeln!(f, " {} {}", c.sense(), c.rhs())?;
        }

        writeln!(f, "Bounds")?;
        for var in self.vars.iter().filter(|v| v.kind != VarKind::Binary) {
            if var.upper.is_finite() {
                writeln!(f, " {} <= {} <= {}", var.lower, var.name, var.upper)?;
            } else {
                writeln!(f, " {} >= {}", var.name, var.lower)?;
            }
        }

        let names = |kind: VarKind| {
            self.vars
                .iter()
                .filter(move |v| v.kind == kind)
                .map(|v| v.name.as_str())
        };
        writeln!(f, "Generals")?;
        for name in names(VarKind::Integer) {
            writeln!(f, " {}", name)?;
        }
        writeln!(f, "Binaries")?;
        for name in names(VarKind::Binary) {
            writeln!(f, " {}", name)?;
        }
        writeln!(f, "End")
    }
}
