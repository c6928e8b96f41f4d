//! Tasks: a payload over an index domain plus the views it touches.

use std::cell::Cell;
use std::fmt;
use std::ops::Range;

use smallvec::SmallVec;
use weft_buffer::{BufferView, Element, ErasedView};
use weft_core::{TaskId, ViewDescriptors};

/// Inline storage for a task's erased views.
pub(crate) type ErasedViews = SmallVec<[ErasedView; 4]>;

// ── ViewSet ────────────────────────────────────────────────────────

/// The views a payload receives.
///
/// Implemented for a single [`BufferView`], tuples of up to six view sets,
/// arrays, and `Vec`s. The scheduler only sees the erased footprints; the
/// payload gets the typed set back by reference.
pub trait ViewSet: Send + Sync + 'static {
    /// Append the erased form of every view in the set.
    fn erase_into(&self, out: &mut SmallVec<[ErasedView; 4]>);
}

impl<U: Element> ViewSet for BufferView<U> {
    fn erase_into(&self, out: &mut SmallVec<[ErasedView; 4]>) {
        out.push(self.erase());
    }
}

impl ViewSet for () {
    fn erase_into(&self, _out: &mut SmallVec<[ErasedView; 4]>) {}
}

impl<V: ViewSet, const N: usize> ViewSet for [V; N] {
    fn erase_into(&self, out: &mut SmallVec<[ErasedView; 4]>) {
        for v in self {
            v.erase_into(out);
        }
    }
}

impl<V: ViewSet> ViewSet for Vec<V> {
    fn erase_into(&self, out: &mut SmallVec<[ErasedView; 4]>) {
        for v in self {
            v.erase_into(out);
        }
    }
}

macro_rules! tuple_view_set {
    ($($name:ident),+) => {
        impl<$($name: ViewSet),+> ViewSet for ($($name,)+) {
            #[allow(non_snake_case)]
            fn erase_into(&self, out: &mut SmallVec<[ErasedView; 4]>) {
                let ($($name,)+) = self;
                $($name.erase_into(out);)+
            }
        }
    };
}

tuple_view_set!(A);
tuple_view_set!(A, B);
tuple_view_set!(A, B, C);
tuple_view_set!(A, B, C, D);
tuple_view_set!(A, B, C, D, E);
tuple_view_set!(A, B, C, D, E, F);

// ── RunBatch ───────────────────────────────────────────────────────

/// A payload with its view set, erased to one virtual call per batch.
pub(crate) trait RunBatch: Send + Sync {
    /// Run every index in `range`, recording the current index in `at` so
    /// a panic can be attributed.
    fn run(&self, range: Range<usize>, at: &Cell<usize>) -> Result<(), String>;
}

struct ParallelFor<V, F> {
    views: V,
    body: F,
}

impl<V, F> RunBatch for ParallelFor<V, F>
where
    V: ViewSet,
    F: Fn(usize, &V) + Send + Sync,
{
    fn run(&self, range: Range<usize>, at: &Cell<usize>) -> Result<(), String> {
        for i in range {
            at.set(i);
            (self.body)(i, &self.views);
        }
        Ok(())
    }
}

struct TryParallelFor<V, F> {
    views: V,
    body: F,
}

impl<V, F, E> RunBatch for TryParallelFor<V, F>
where
    V: ViewSet,
    F: Fn(usize, &V) -> Result<(), E> + Send + Sync,
    E: fmt::Display,
{
    fn run(&self, range: Range<usize>, at: &Cell<usize>) -> Result<(), String> {
        for i in range {
            at.set(i);
            (self.body)(i, &self.views).map_err(|e| e.to_string())?;
        }
        Ok(())
    }
}

struct Barrier;

impl RunBatch for Barrier {
    fn run(&self, _range: Range<usize>, _at: &Cell<usize>) -> Result<(), String> {
        Ok(())
    }
}

// ── Task ───────────────────────────────────────────────────────────

/// A unit of schedulable work.
///
/// Built once, consumed by [`Scheduler::schedule`](crate::Scheduler::schedule).
/// The payload runs once per index of `0..domain`, in batches of
/// contiguous indices, in any order, on any worker. It must only touch the
/// views it is given.
pub struct Task {
    pub(crate) id: TaskId,
    pub(crate) label: String,
    pub(crate) domain: usize,
    pub(crate) views: ErasedViews,
    pub(crate) body: Box<dyn RunBatch>,
}

impl Task {
    fn empty(label: String, domain: usize) -> Self {
        Self {
            id: TaskId::next(),
            label,
            domain,
            views: ErasedViews::new(),
            body: Box::new(Barrier),
        }
    }

    /// A parallel-for over `0..domain`.
    ///
    /// ```
    /// use weft_buffer::BufferRegistry;
    /// use weft_core::{AccessMode, LifetimeClass};
    /// use weft_sched::Task;
    ///
    /// let registry = BufferRegistry::default();
    /// let values = registry
    ///     .create_from_slice(&[1i32, 2, 3], LifetimeClass::Persistent)
    ///     .unwrap();
    /// let view = values.view_all(AccessMode::ReadWrite).unwrap();
    /// let task = Task::parallel_for("negate", view.len(), view, |i, v| {
    ///     v.update(i, |x: i32| -x)
    /// });
    /// assert_eq!(task.domain(), 3);
    /// ```
    pub fn parallel_for<V, F>(label: impl Into<String>, domain: usize, views: V, body: F) -> Self
    where
        V: ViewSet,
        F: Fn(usize, &V) + Send + Sync + 'static,
    {
        let mut task = Self::empty(label.into(), domain);
        views.erase_into(&mut task.views);
        task.body = Box::new(ParallelFor { views, body });
        task
    }

    /// A parallel-for whose payload may fail. The first `Err` in a batch
    /// stops that batch and is reported like a panic.
    pub fn try_parallel_for<V, F, E>(
        label: impl Into<String>,
        domain: usize,
        views: V,
        body: F,
    ) -> Self
    where
        V: ViewSet,
        F: Fn(usize, &V) -> Result<(), E> + Send + Sync + 'static,
        E: fmt::Display + 'static,
    {
        let mut task = Self::empty(label.into(), domain);
        views.erase_into(&mut task.views);
        task.body = Box::new(TryParallelFor { views, body });
        task
    }

    /// A non-parallel task: the payload runs once, as a domain of one.
    pub fn single<V, F>(label: impl Into<String>, views: V, body: F) -> Self
    where
        V: ViewSet,
        F: Fn(&V) + Send + Sync + 'static,
    {
        Self::parallel_for(label, 1, views, move |_, v| body(v))
    }

    /// A task with no views and an empty domain; completes as soon as its
    /// prerequisites do.
    pub(crate) fn barrier(label: impl Into<String>) -> Self {
        Self::empty(label.into(), 0)
    }

    /// The id its handle will carry.
    pub fn id(&self) -> TaskId {
        self.id
    }

    /// Human-readable label used in diagnostics.
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Number of indices.
    pub fn domain(&self) -> usize {
        self.domain
    }

    /// Footprints of every view the task holds.
    pub fn descriptors(&self) -> ViewDescriptors {
        self.views.iter().map(|v| v.descriptor).collect()
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("id", &self.id)
            .field("label", &self.label)
            .field("domain", &self.domain)
            .field("views", &self.views.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use weft_buffer::BufferRegistry;
    use weft_core::{AccessMode, LifetimeClass};

    fn run_all(task: &Task) -> Result<(), String> {
        task.body.run(0..task.domain, &Cell::new(0))
    }

    #[test]
    fn tuple_views_are_erased_in_order() {
        let reg = BufferRegistry::default();
        let a = reg.create::<f32>(4, LifetimeClass::Persistent).unwrap();
        let b = reg.create::<u8>(8, LifetimeClass::Persistent).unwrap();
        let task = Task::parallel_for(
            "pair",
            4,
            (
                a.view_all(AccessMode::ReadOnly).unwrap(),
                b.view_all(AccessMode::WriteOnly).unwrap(),
            ),
            |_, _| {},
        );
        let d = task.descriptors();
        assert_eq!(d.len(), 2);
        assert_eq!(d[0].buffer, a.id());
        assert_eq!(d[1].buffer, b.id());
        assert_eq!(d[1].mode, AccessMode::WriteOnly);
    }

    #[test]
    fn array_and_vec_view_sets() {
        let reg = BufferRegistry::default();
        let rgba = reg.create::<u8>(16, LifetimeClass::Persistent).unwrap();
        let lanes: [BufferView<u8>; 3] =
            std::array::from_fn(|c| rgba.view(c, 4, 4, AccessMode::ReadWrite).unwrap());
        let task = Task::parallel_for("lanes", 4, lanes.to_vec(), |_, _| {});
        assert_eq!(task.descriptors().len(), 3);
        let task = Task::parallel_for("lanes", 4, lanes, |_, _| {});
        assert_eq!(task.descriptors()[2].byte_offset, 2);
    }

    #[test]
    fn single_runs_once() {
        let reg = BufferRegistry::default();
        let buf = reg.create::<u32>(1, LifetimeClass::Persistent).unwrap();
        let view = buf.view_all(AccessMode::ReadWrite).unwrap();
        let task = Task::single("bump", view, |v| v.update(0, |x| x + 1));
        assert_eq!(task.domain(), 1);
        run_all(&task).unwrap();
        assert_eq!(buf.to_vec().unwrap(), vec![1]);
    }

    #[test]
    fn fallible_payload_stops_at_first_error() {
        let reg = BufferRegistry::default();
        let buf = reg.create::<u32>(8, LifetimeClass::Persistent).unwrap();
        let view = buf.view_all(AccessMode::WriteOnly).unwrap();
        let task = Task::try_parallel_for("checked", 8, view, |i, v| {
            if i == 5 {
                return Err(format!("bad index {i}"));
            }
            v.set(i, 1);
            Ok(())
        });
        let at = Cell::new(0);
        let err = task.body.run(0..8, &at).unwrap_err();
        assert_eq!(err, "bad index 5");
        assert_eq!(at.get(), 5);
        assert_eq!(buf.to_vec().unwrap(), vec![1, 1, 1, 1, 1, 0, 0, 0]);
    }

    #[test]
    fn task_ids_are_distinct() {
        let a = Task::barrier("a");
        let b = Task::barrier("b");
        assert_ne!(a.id(), b.id());
        assert_eq!(a.domain(), 0);
        assert!(a.descriptors().is_empty());
    }
}
