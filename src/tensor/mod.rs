//! A small tensor library: typed, possibly sparse, multi-dimensional values and the
//! primitive operations (`map`, `join`, `reduce`, `rename`, `generate`) the
//! expression nodes are expressed in terms of.
mod tensor_type;

pub use tensor_type::*;

use smallvec::SmallVec;
use std::collections::BTreeMap;
use std::fmt::{self, Display};

use crate::typechecking::TypeError;
use crate::Error;

/// A label along one dimension: a position in an indexed dimension or a
/// string in a mapped one.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Label {
    Index(usize),
    Name(String),
}

impl Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Label::Index(index) => Display::fmt(index, f),
            Label::Name(name) => f.write_str(name),
        }
    }
}

impl From<usize> for Label {
    fn from(index: usize) -> Self {
        Label::Index(index)
    }
}

impl From<&str> for Label {
    fn from(name: &str) -> Self {
        Label::Name(name.to_owned())
    }
}

/// Labels in the order of the (sorted) dimensions of the tensor type.
pub type TensorAddress = SmallVec<[Label; 4]>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Aggregator {
    Avg,
    Count,
    Max,
    Median,
    Min,
    Prod,
    Sum,
}

impl Aggregator {
    pub fn name(self) -> &'static str {
        match self {
            Aggregator::Avg => "avg",
            Aggregator::Count => "count",
            Aggregator::Max => "max",
            Aggregator::Median => "median",
            Aggregator::Min => "min",
            Aggregator::Prod => "prod",
            Aggregator::Sum => "sum",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "avg" => Some(Aggregator::Avg),
            "count" => Some(Aggregator::Count),
            "max" => Some(Aggregator::Max),
            "median" => Some(Aggregator::Median),
            "min" => Some(Aggregator::Min),
            "prod" => Some(Aggregator::Prod),
            "sum" => Some(Aggregator::Sum),
            _ => None,
        }
    }

    pub fn aggregate(self, values: &[f64]) -> f64 {
        match self {
            Aggregator::Avg if values.is_empty() => 0.0,
            Aggregator::Avg => values.iter().sum::<f64>() / values.len() as f64,
            Aggregator::Count => values.len() as f64,
            Aggregator::Max => values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            Aggregator::Min => values.iter().copied().fold(f64::INFINITY, f64::min),
            Aggregator::Prod => values.iter().product(),
            Aggregator::Sum => values.iter().sum(),
            Aggregator::Median => {
                if values.iter().any(|v| v.is_nan()) {
                    return f64::NAN;
                }
                let mut sorted = values.to_vec();
                sorted.sort_by(f64::total_cmp);
                match sorted.len() {
                    0 => f64::NAN,
                    n if n % 2 == 1 => sorted[n / 2],
                    n => (sorted[n / 2 - 1] + sorted[n / 2]) / 2.0,
                }
            }
        }
    }
}

impl Display for Aggregator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Where a dimension of a join result takes its label from.
#[derive(Clone, Copy)]
enum JoinSource {
    Both(usize, usize),
    Left(usize),
    Right(usize),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Tensor {
    tensor_type: TensorType,
    cells: BTreeMap<TensorAddress, f64>,
}

impl Tensor {
    /// A rank 0 tensor holding a single value.
    pub fn scalar(value: f64) -> Self {
        let mut cells = BTreeMap::new();
        cells.insert(TensorAddress::new(), value);
        Self {
            tensor_type: TensorType::empty(),
            cells,
        }
    }

    /// Creates a tensor from explicit cells, validating every address against the type.
    pub fn from_cells(
        tensor_type: TensorType,
        cells: impl IntoIterator<Item = (TensorAddress, f64)>,
    ) -> Result<Self, Error> {
        let mut result = BTreeMap::new();
        for (address, value) in cells {
            if address.len() != tensor_type.rank() {
                return Err(Error::Argument(format!(
                    "Address with {} labels does not fit {}",
                    address.len(),
                    tensor_type
                )));
            }
            for (dimension, label) in tensor_type.dimensions().iter().zip(&address) {
                let fits = match (dimension.kind(), label) {
                    (DimensionKind::Indexed(Some(size)), Label::Index(index)) => *index < size,
                    (DimensionKind::Indexed(None), Label::Index(_)) => true,
                    (DimensionKind::Mapped, Label::Name(_)) => true,
                    _ => false,
                };
                if !fits {
                    return Err(Error::Argument(format!(
                        "Label '{label}' is not valid for dimension {dimension} of {tensor_type}"
                    )));
                }
            }
            result.insert(address, tensor_type.cell_type().round(value));
        }
        Ok(Self {
            tensor_type,
            cells: result,
        })
    }

    /// Creates a dense tensor from values given in row-major order of the sorted dimensions.
    pub fn dense(tensor_type: TensorType, values: &[f64]) -> Result<Self, Error> {
        let mut remaining = values.iter();
        let tensor = Self::generate(tensor_type, |_| {
            remaining
                .next()
                .copied()
                .ok_or_else(|| Error::Argument("Too few values for a dense tensor".to_owned()))
        })?;
        if remaining.next().is_some() {
            return Err(Error::Argument(format!(
                "Too many values for {}",
                tensor.tensor_type
            )));
        }
        Ok(tensor)
    }

    /// Creates a tensor by computing every cell of a bound type from its indices.
    pub fn generate(
        tensor_type: TensorType,
        mut f: impl FnMut(&[usize]) -> Result<f64, Error>,
    ) -> Result<Self, Error> {
        let sizes = tensor_type
            .dimensions()
            .iter()
            .map(|d| {
                d.size().ok_or_else(|| {
                    Error::Argument(format!(
                        "A tensor can only be generated from a bound type, \
                         but {tensor_type} has dimension {d}"
                    ))
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        let mut cells = BTreeMap::new();
        if sizes.iter().all(|size| *size > 0) {
            let mut indices = vec![0; sizes.len()];
            'cells: loop {
                let value = f(&indices)?;
                let address = indices.iter().map(|i| Label::Index(*i)).collect();
                cells.insert(address, tensor_type.cell_type().round(value));
                let mut d = sizes.len();
                loop {
                    if d == 0 {
                        break 'cells;
                    }
                    d -= 1;
                    indices[d] += 1;
                    if indices[d] < sizes[d] {
                        break;
                    }
                    indices[d] = 0;
                }
            }
        }
        Ok(Self { tensor_type, cells })
    }

    pub fn tensor_type(&self) -> &TensorType {
        &self.tensor_type
    }

    pub fn cells(&self) -> impl Iterator<Item = (&TensorAddress, f64)> {
        self.cells.iter().map(|(address, value)| (address, *value))
    }

    pub fn get(&self, address: &[Label]) -> Option<f64> {
        self.cells.get(address).copied()
    }

    pub fn size(&self) -> usize {
        self.cells.len()
    }

    /// The value of a rank 0 tensor.
    pub fn as_double(&self) -> Result<f64, Error> {
        if self.tensor_type.rank() > 0 {
            return Err(Error::Evaluation(format!(
                "Cannot use a tensor of type {} as a scalar",
                self.tensor_type
            )));
        }
        Ok(self.cells.values().next().copied().unwrap_or(0.0))
    }

    pub fn map(&self, mut f: impl FnMut(f64) -> Result<f64, Error>) -> Result<Tensor, Error> {
        let tensor_type = self.tensor_type.map_type();
        let mut cells = BTreeMap::new();
        for (address, value) in &self.cells {
            cells.insert(address.clone(), tensor_type.cell_type().round(f(*value)?));
        }
        Ok(Tensor { tensor_type, cells })
    }

    /// Combines every pair of cells agreeing on the common dimensions.
    pub fn join(
        &self,
        other: &Tensor,
        mut f: impl FnMut(f64, f64) -> Result<f64, Error>,
    ) -> Result<Tensor, Error> {
        let tensor_type = self.tensor_type.join_type(&other.tensor_type)?;
        let sources = tensor_type
            .dimensions()
            .iter()
            .map(|d| {
                match (
                    self.tensor_type.index_of(d.name()),
                    other.tensor_type.index_of(d.name()),
                ) {
                    (Some(l), Some(r)) => Ok(JoinSource::Both(l, r)),
                    (Some(l), None) => Ok(JoinSource::Left(l)),
                    (None, Some(r)) => Ok(JoinSource::Right(r)),
                    (None, None) => Err(Error::Evaluation(format!(
                        "Dimension {d} is in neither join argument"
                    ))),
                }
            })
            .collect::<Result<Vec<_>, _>>()?;

        let mut cells = BTreeMap::new();
        for (left_address, left) in &self.cells {
            'right: for (right_address, right) in &other.cells {
                let mut address = TensorAddress::with_capacity(sources.len());
                for (dimension, source) in tensor_type.dimensions().iter().zip(&sources) {
                    let label = match *source {
                        JoinSource::Both(l, r) => {
                            if left_address[l] != right_address[r] {
                                continue 'right;
                            }
                            &left_address[l]
                        }
                        JoinSource::Left(l) => &left_address[l],
                        JoinSource::Right(r) => &right_address[r],
                    };
                    if let (Some(size), Label::Index(index)) = (dimension.size(), label) {
                        if *index >= size {
                            continue 'right;
                        }
                    }
                    address.push(label.clone());
                }
                let value = tensor_type.cell_type().round(f(*left, *right)?);
                cells.insert(address, value);
            }
        }
        Ok(Tensor { tensor_type, cells })
    }

    /// Aggregates the cells over the given dimensions, or over all dimensions if none are given.
    pub fn reduce<S: AsRef<str>>(
        &self,
        aggregator: Aggregator,
        dimensions: &[S],
    ) -> Result<Tensor, Error> {
        let tensor_type = self.tensor_type.reduce_type(dimensions)?;
        let kept: Vec<usize> = tensor_type
            .dimensions()
            .iter()
            .filter_map(|d| self.tensor_type.index_of(d.name()))
            .collect();

        let mut groups: BTreeMap<TensorAddress, Vec<f64>> = BTreeMap::new();
        for (address, value) in &self.cells {
            let projected = kept.iter().map(|i| address[*i].clone()).collect();
            groups.entry(projected).or_default().push(*value);
        }
        if tensor_type.rank() == 0 && groups.is_empty() {
            groups.insert(TensorAddress::new(), vec![]);
        }
        let cells = groups
            .into_iter()
            .map(|(address, values)| {
                let value = tensor_type.cell_type().round(aggregator.aggregate(&values));
                (address, value)
            })
            .collect();
        Ok(Tensor { tensor_type, cells })
    }

    /// Renames dimensions `from` to `to`, pairwise.
    pub fn rename<S: AsRef<str>>(&self, from: &[S], to: &[S]) -> Result<Tensor, Error> {
        let tensor_type = self.tensor_type.rename_type(from, to)?;
        // position in this tensor of each dimension of the result
        let positions = tensor_type
            .dimensions()
            .iter()
            .map(|d| {
                let old_name = to
                    .iter()
                    .position(|to| to.as_ref() == d.name())
                    .map_or(d.name(), |i| from[i].as_ref());
                self.tensor_type
                    .index_of(old_name)
                    .ok_or_else(|| TypeError::UnknownDimension {
                        dimension: old_name.to_owned(),
                        tensor_type: self.tensor_type.clone(),
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;
        let cells = self
            .cells
            .iter()
            .map(|(address, value)| {
                let renamed = positions.iter().map(|i| address[*i].clone()).collect();
                (renamed, *value)
            })
            .collect();
        Ok(Tensor { tensor_type, cells })
    }
}

impl Display for Tensor {
    /// The literal form, e.g. `tensor(x[2]):{{x:0}:1.0,{x:1}:2.0}`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{{", self.tensor_type)?;
        for (i, (address, value)) in self.cells.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            f.write_str("{")?;
            let dimensions = self.tensor_type.dimensions().iter();
            for (j, (dimension, label)) in dimensions.zip(address).enumerate() {
                if j > 0 {
                    f.write_str(",")?;
                }
                write!(f, "{}:{}", dimension.name(), label)?;
            }
            write!(f, "}}:{}", crate::util::format_double(*value))?;
        }
        f.write_str("}")
    }
}
