use datafusion_common::ScalarValue;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum CmpOp {
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
}

impl CmpOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            CmpOp::Eq => "=",
            CmpOp::NotEq => "!=",
            CmpOp::Lt => "<",
            CmpOp::LtEq => "<=",
            CmpOp::Gt => ">",
            CmpOp::GtEq => ">=",
        }
    }
}

/// Boolean expression tree evaluated against in-memory record batches.
///
/// Produced by [`compile_expression`](crate::compile_expression) from residual
/// filters and evaluated by [`RowFilter`](crate::RowFilter).
#[derive(Clone, Debug, PartialEq)]
pub enum Expr {
    True,
    Cmp {
        column: String,
        op: CmpOp,
        value: ScalarValue,
    },
    InList {
        column: String,
        values: Vec<ScalarValue>,
        negated: bool,
    },
    /// Literal substring match on a string column.
    Contains {
        column: String,
        pattern: String,
    },
    /// A list column contains the value.
    ListContains {
        column: String,
        value: ScalarValue,
    },
    And(Vec<Expr>),
    Or(Vec<Expr>),
}

impl Expr {
    /// Build a comparison expression with an explicit operator.
    pub fn cmp(column: impl Into<String>, op: CmpOp, value: ScalarValue) -> Self {
        Expr::Cmp {
            column: column.into(),
            op,
            value,
        }
    }

    /// Build an equality expression (`=`).
    pub fn eq(column: impl Into<String>, value: ScalarValue) -> Self {
        Self::cmp(column, CmpOp::Eq, value)
    }

    /// Build a greater-than expression (`>`).
    pub fn gt(column: impl Into<String>, value: ScalarValue) -> Self {
        Self::cmp(column, CmpOp::Gt, value)
    }

    /// Build an IN (...) expression.
    pub fn in_list(column: impl Into<String>, values: Vec<ScalarValue>) -> Self {
        Expr::InList {
            column: column.into(),
            values,
            negated: false,
        }
    }

    /// Build a NOT IN (...) expression.
    pub fn not_in_list(column: impl Into<String>, values: Vec<ScalarValue>) -> Self {
        Expr::InList {
            column: column.into(),
            values,
            negated: true,
        }
    }

    /// Build a substring match expression.
    pub fn contains(column: impl Into<String>, pattern: impl Into<String>) -> Self {
        Expr::Contains {
            column: column.into(),
            pattern: pattern.into(),
        }
    }

    /// Build a list membership expression.
    pub fn list_contains(column: impl Into<String>, value: ScalarValue) -> Self {
        Expr::ListContains {
            column: column.into(),
            value,
        }
    }

    /// Build an AND expression.
    pub fn and(parts: Vec<Expr>) -> Self {
        Expr::And(parts)
    }

    /// Build an OR expression.
    pub fn or(parts: Vec<Expr>) -> Self {
        Expr::Or(parts)
    }
}

impl std::fmt::Display for Expr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Expr::True => write!(f, "TRUE"),
            Expr::Cmp { column, op, value } => {
                write!(f, "{} {} {:?}", column, op.symbol(), value)
            }
            Expr::InList {
                column,
                values,
                negated,
            } => {
                if *negated {
                    write!(f, "{} NOT IN (", column)?;
                } else {
                    write!(f, "{} IN (", column)?;
                }
                for (i, v) in values.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{:?}", v)?;
                }
                write!(f, ")")
            }
            Expr::Contains { column, pattern } => {
                write!(f, "{} LIKE '%{}%'", column, pattern)
            }
            Expr::ListContains { column, value } => {
                write!(f, "array_contains({}, {:?})", column, value)
            }
            Expr::And(parts) => {
                if parts.is_empty() {
                    write!(f, "TRUE")
                } else if parts.len() == 1 {
                    write!(f, "{}", parts[0])
                } else {
                    write!(f, "(")?;
                    for (i, part) in parts.iter().enumerate() {
                        if i > 0 {
                            write!(f, " AND ")?;
                        }
                        write!(f, "{}", part)?;
                    }
                    write!(f, ")")
                }
            }
            Expr::Or(parts) => {
                if parts.is_empty() {
                    write!(f, "FALSE")
                } else if parts.len() == 1 {
                    write!(f, "{}", parts[0])
                } else {
                    write!(f, "(")?;
                    for (i, part) in parts.iter().enumerate() {
                        if i > 0 {
                            write!(f, " OR ")?;
                        }
                        write!(f, "{}", part)?;
                    }
                    write!(f, ")")
                }
            }
        }
    }
}
