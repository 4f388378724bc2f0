use std::fmt::{self, Display};
use std::str::FromStr;

use crate::typechecking::TypeError;
use crate::Error;

/// The value type of the cells of a tensor, ordered by increasing precision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum CellType {
    Int8,
    BFloat16,
    #[default]
    Float,
    Double,
}

impl CellType {
    pub fn name(self) -> &'static str {
        match self {
            CellType::Int8 => "int8",
            CellType::BFloat16 => "bfloat16",
            CellType::Float => "float",
            CellType::Double => "double",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "int8" => Some(CellType::Int8),
            "bfloat16" => Some(CellType::BFloat16),
            "float" => Some(CellType::Float),
            "double" => Some(CellType::Double),
            _ => None,
        }
    }

    /// The most precise of two cell types.
    pub fn combine(self, other: CellType) -> CellType {
        self.max(other)
    }

    /// Cell type of the result of computing on cells of this type:
    /// the small types are not used for intermediate results.
    pub fn promoted(self) -> CellType {
        self.max(CellType::Float)
    }

    /// Rounds a value to what a cell of this type can hold.
    pub fn round(self, value: f64) -> f64 {
        match self {
            CellType::Double => value,
            CellType::Float => value as f32 as f64,
            CellType::BFloat16 => {
                let bits = (value as f32).to_bits() & 0xffff_0000;
                f32::from_bits(bits) as f64
            }
            // `as` saturates and maps NaN to 0
            CellType::Int8 => value as i8 as f64,
        }
    }
}

impl Display for CellType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DimensionKind {
    /// A dense dimension, optionally with a known size.
    Indexed(Option<usize>),
    /// A sparse dimension addressed by string labels.
    Mapped,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Dimension {
    name: String,
    kind: DimensionKind,
}

impl Dimension {
    pub fn indexed(name: impl Into<String>, size: usize) -> Self {
        Self {
            name: name.into(),
            kind: DimensionKind::Indexed(Some(size)),
        }
    }

    pub fn indexed_unbound(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: DimensionKind::Indexed(None),
        }
    }

    pub fn mapped(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: DimensionKind::Mapped,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> DimensionKind {
        self.kind
    }

    pub fn is_indexed(&self) -> bool {
        matches!(self.kind, DimensionKind::Indexed(_))
    }

    /// The size of a bound indexed dimension.
    pub fn size(&self) -> Option<usize> {
        match self.kind {
            DimensionKind::Indexed(size) => size,
            DimensionKind::Mapped => None,
        }
    }

    fn renamed(&self, name: &str) -> Dimension {
        Dimension {
            name: name.to_owned(),
            kind: self.kind,
        }
    }

    fn with_kind(&self, kind: DimensionKind) -> Dimension {
        Dimension {
            name: self.name.clone(),
            kind,
        }
    }
}

impl Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            DimensionKind::Indexed(Some(size)) => write!(f, "{}[{}]", self.name, size),
            DimensionKind::Indexed(None) => write!(f, "{}[]", self.name),
            DimensionKind::Mapped => write!(f, "{}{{}}", self.name),
        }
    }
}

/// The type of a tensor: a cell type and a set of dimensions kept sorted by name.
/// The type without dimensions is the type of scalars.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TensorType {
    cell_type: CellType,
    dimensions: Vec<Dimension>,
}

impl TensorType {
    pub fn new(
        cell_type: CellType,
        dimensions: impl IntoIterator<Item = Dimension>,
    ) -> Result<Self, Error> {
        let mut dimensions: Vec<Dimension> = dimensions.into_iter().collect();
        dimensions.sort_by(|a, b| a.name.cmp(&b.name));
        if let Some(pair) = dimensions.windows(2).find(|pair| pair[0].name == pair[1].name) {
            return Err(Error::Argument(format!(
                "A tensor type cannot contain dimension '{}' more than once",
                pair[0].name
            )));
        }
        Ok(Self::sorted(cell_type, dimensions))
    }

    /// Scalars are always doubles.
    fn sorted(cell_type: CellType, dimensions: Vec<Dimension>) -> Self {
        let cell_type = if dimensions.is_empty() {
            CellType::Double
        } else {
            cell_type
        };
        Self {
            cell_type,
            dimensions,
        }
    }

    /// The rank 0 type.
    pub fn empty() -> Self {
        Self::sorted(CellType::Double, vec![])
    }

    pub fn cell_type(&self) -> CellType {
        self.cell_type
    }

    pub fn dimensions(&self) -> &[Dimension] {
        &self.dimensions
    }

    pub fn rank(&self) -> usize {
        self.dimensions.len()
    }

    pub fn dimension(&self, name: &str) -> Option<&Dimension> {
        self.index_of(name).map(|i| &self.dimensions[i])
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.dimensions
            .binary_search_by(|d| d.name.as_str().cmp(name))
            .ok()
    }

    pub fn with_cell_type(&self, cell_type: CellType) -> TensorType {
        Self::sorted(cell_type, self.dimensions.clone())
    }

    /// Whether every dimension is indexed with a known size.
    pub fn is_bound(&self) -> bool {
        self.dimensions.iter().all(|d| d.size().is_some())
    }

    /// The type resulting from joining tensors of these two types.
    pub fn join_type(&self, other: &TensorType) -> Result<TensorType, TypeError> {
        let mut dimensions = Vec::with_capacity(self.rank() + other.rank());
        let (mut i, mut j) = (0, 0);
        while i < self.rank() || j < other.rank() {
            let (a, b) = (self.dimensions.get(i), other.dimensions.get(j));
            match (a, b) {
                (Some(a), Some(b)) if a.name == b.name => {
                    dimensions.push(join_dimension(a, b)?);
                    i += 1;
                    j += 1;
                }
                (Some(a), Some(b)) if a.name < b.name => {
                    dimensions.push(a.clone());
                    i += 1;
                }
                (Some(a), None) => {
                    dimensions.push(a.clone());
                    i += 1;
                }
                (_, Some(b)) => {
                    dimensions.push(b.clone());
                    j += 1;
                }
                (None, None) => break,
            }
        }
        // a scalar operand does not affect the cell type
        let cell_type = match (self.rank(), other.rank()) {
            (0, _) => other.cell_type,
            (_, 0) => self.cell_type,
            _ => self.cell_type.combine(other.cell_type),
        };
        Ok(Self::sorted(cell_type.promoted(), dimensions))
    }

    /// The type resulting from mapping a function over the cells of this type.
    pub fn map_type(&self) -> TensorType {
        self.with_cell_type(self.cell_type.promoted())
    }

    /// The type resulting from reducing the given dimensions, or all of them if none are given.
    pub fn reduce_type<S: AsRef<str>>(&self, dimensions: &[S]) -> Result<TensorType, TypeError> {
        if dimensions.is_empty() {
            return Ok(TensorType::empty());
        }
        for name in dimensions {
            if self.index_of(name.as_ref()).is_none() {
                return Err(TypeError::UnknownDimension {
                    dimension: name.as_ref().to_owned(),
                    tensor_type: self.clone(),
                });
            }
        }
        let remaining = self
            .dimensions
            .iter()
            .filter(|d| !dimensions.iter().any(|name| name.as_ref() == d.name))
            .cloned()
            .collect();
        Ok(Self::sorted(self.cell_type.promoted(), remaining))
    }

    /// The type resulting from renaming dimensions `from` to `to`, pairwise.
    pub fn rename_type<S: AsRef<str>>(
        &self,
        from: &[S],
        to: &[S],
    ) -> Result<TensorType, TypeError> {
        let mut dimensions = self.dimensions.clone();
        for (from, to) in from.iter().zip(to) {
            let index = self
                .index_of(from.as_ref())
                .ok_or_else(|| TypeError::UnknownDimension {
                    dimension: from.as_ref().to_owned(),
                    tensor_type: self.clone(),
                })?;
            dimensions[index] = dimensions[index].renamed(to.as_ref());
        }
        dimensions.sort_by(|a, b| a.name.cmp(&b.name));
        if let Some(pair) = dimensions.windows(2).find(|pair| pair[0].name == pair[1].name) {
            return Err(TypeError::DuplicateDimension {
                dimension: pair[0].name.clone(),
                tensor_type: self.clone(),
            });
        }
        Ok(Self::sorted(self.cell_type, dimensions))
    }

    /// Returns the most specific type which is a generalization of both this and the
    /// given type, dimension by dimension, or None if the two types have different
    /// dimension names or kinds.
    pub fn dimensionwise_generalization_with(&self, other: &TensorType) -> Option<TensorType> {
        if self == other {
            return Some(self.clone());
        }
        if self.rank() != other.rank() {
            return None;
        }
        let mut dimensions = Vec::with_capacity(self.rank());
        for (a, b) in self.dimensions.iter().zip(&other.dimensions) {
            if a.name != b.name {
                return None;
            }
            let kind = match (a.kind, b.kind) {
                (DimensionKind::Indexed(Some(x)), DimensionKind::Indexed(Some(y))) if x == y => {
                    DimensionKind::Indexed(Some(x))
                }
                (DimensionKind::Indexed(_), DimensionKind::Indexed(_)) => {
                    DimensionKind::Indexed(None)
                }
                (DimensionKind::Mapped, DimensionKind::Mapped) => DimensionKind::Mapped,
                _ => return None,
            };
            dimensions.push(a.with_kind(kind));
        }
        Some(Self::sorted(self.cell_type.combine(other.cell_type), dimensions))
    }
}

fn join_dimension(a: &Dimension, b: &Dimension) -> Result<Dimension, TypeError> {
    let kind = match (a.kind, b.kind) {
        (DimensionKind::Indexed(Some(x)), DimensionKind::Indexed(Some(y))) => {
            DimensionKind::Indexed(Some(x.min(y)))
        }
        (DimensionKind::Indexed(x), DimensionKind::Indexed(y)) => DimensionKind::Indexed(x.or(y)),
        (DimensionKind::Mapped, DimensionKind::Mapped) => DimensionKind::Mapped,
        _ => {
            return Err(TypeError::IncompatibleJoin {
                left: a.clone(),
                right: b.clone(),
            })
        }
    };
    Ok(a.with_kind(kind))
}

impl Display for TensorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("tensor")?;
        if self.cell_type != CellType::Double {
            write!(f, "<{}>", self.cell_type)?;
        }
        f.write_str("(")?;
        for (i, dimension) in self.dimensions.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            Display::fmt(dimension, f)?;
        }
        f.write_str(")")
    }
}

impl FromStr for TensorType {
    type Err = Error;

    /// Parses the text form of a type, e.g. `tensor<float>(x[3],y{},z[])`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || Error::Argument(format!("Invalid tensor type '{s}'"));
        let rest = s.trim().strip_prefix("tensor").ok_or_else(invalid)?;
        let (cell_type, rest) = match rest.strip_prefix('<') {
            Some(rest) => {
                let (name, rest) = rest.split_once('>').ok_or_else(invalid)?;
                (CellType::from_name(name.trim()).ok_or_else(invalid)?, rest)
            }
            None => (CellType::Double, rest),
        };
        let body = rest
            .trim()
            .strip_prefix('(')
            .and_then(|rest| rest.strip_suffix(')'))
            .ok_or_else(invalid)?;
        let mut dimensions = vec![];
        for text in body.split(',').map(str::trim).filter(|text| !text.is_empty()) {
            let dimension = if let Some(name) = text.strip_suffix("{}") {
                Dimension::mapped(name.trim())
            } else if let Some(name) = text.strip_suffix("[]") {
                Dimension::indexed_unbound(name.trim())
            } else {
                let (name, size) = text
                    .strip_suffix(']')
                    .and_then(|text| text.split_once('['))
                    .ok_or_else(invalid)?;
                let size = size.trim().parse().map_err(|_| invalid())?;
                Dimension::indexed(name.trim(), size)
            };
            if dimension.name.is_empty() {
                return Err(invalid());
            }
            dimensions.push(dimension);
        }
        TensorType::new(cell_type, dimensions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(s: &str) -> TensorType {
        s.parse().unwrap()
    }

    #[test]
    fn parse_and_display() {
        assert_eq!(t("tensor(y{},x[3])").to_string(), "tensor(x[3],y{})");
        assert_eq!(t("tensor<float>(x[])").to_string(), "tensor<float>(x[])");
        assert_eq!(t("tensor()"), TensorType::empty());
        // scalars are always double
        assert_eq!(t("tensor<int8>()"), TensorType::empty());
        assert!("tensor(x[3],x[2])".parse::<TensorType>().is_err());
        assert!("tensor(x[a])".parse::<TensorType>().is_err());
        assert!("matrix(x[2])".parse::<TensorType>().is_err());
    }

    #[test]
    fn generalization() {
        assert_eq!(
            t("tensor(x[2])").dimensionwise_generalization_with(&t("tensor(x[3])")),
            Some(t("tensor(x[])"))
        );
        assert_eq!(
            t("tensor(x[2])").dimensionwise_generalization_with(&t("tensor(x[2])")),
            Some(t("tensor(x[2])"))
        );
        assert_eq!(
            t("tensor<float>(x{})").dimensionwise_generalization_with(&t("tensor(x{})")),
            Some(t("tensor(x{})"))
        );
        assert_eq!(
            t("tensor(x[2])").dimensionwise_generalization_with(&t("tensor(x{})")),
            None
        );
        assert_eq!(
            t("tensor(x[2])").dimensionwise_generalization_with(&t("tensor(y[2])")),
            None
        );
        assert_eq!(
            t("tensor(x[2])").dimensionwise_generalization_with(&TensorType::empty()),
            None
        );
    }

    #[test]
    fn join_types() {
        assert_eq!(
            t("tensor(x[3])").join_type(&t("tensor(y{})")).unwrap(),
            t("tensor(x[3],y{})")
        );
        assert_eq!(
            t("tensor(x[3])").join_type(&t("tensor(x[2])")).unwrap(),
            t("tensor(x[2])")
        );
        assert_eq!(
            t("tensor(x[])").join_type(&t("tensor(x[4])")).unwrap(),
            t("tensor(x[4])")
        );
        assert_eq!(
            t("tensor<int8>(x[3])").join_type(&t("tensor<int8>(x[3])")).unwrap(),
            t("tensor<float>(x[3])")
        );
        assert_eq!(
            t("tensor<float>(x[3])").join_type(&TensorType::empty()).unwrap(),
            t("tensor<float>(x[3])")
        );
        assert_eq!(
            TensorType::empty().join_type(&TensorType::empty()).unwrap(),
            TensorType::empty()
        );
        assert!(matches!(
            t("tensor(x[3])").join_type(&t("tensor(x{})")),
            Err(TypeError::IncompatibleJoin { .. })
        ));
    }

    #[test]
    fn reduce_and_rename_types() {
        let matrix = t("tensor(x[2],y[3])");
        assert_eq!(matrix.reduce_type(&["x"]).unwrap(), t("tensor(y[3])"));
        assert_eq!(matrix.reduce_type::<&str>(&[]).unwrap(), TensorType::empty());
        assert!(matrix.reduce_type(&["z"]).is_err());
        assert_eq!(
            matrix.rename_type(&["x"], &["z"]).unwrap(),
            t("tensor(y[3],z[2])")
        );
        assert!(matches!(
            matrix.rename_type(&["x"], &["y"]),
            Err(TypeError::DuplicateDimension { .. })
        ));
    }

    #[test]
    fn cell_rounding() {
        assert_eq!(CellType::Int8.round(300.0), 127.0);
        assert_eq!(CellType::Int8.round(-1.7), -1.0);
        assert_eq!(CellType::Float.round(0.1), 0.1f32 as f64);
        assert_eq!(CellType::BFloat16.round(1.0), 1.0);
        assert_eq!(CellType::Double.round(0.1), 0.1);
    }
}
