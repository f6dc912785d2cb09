use crate::failure::WorkerFailure;

use std::sync::Arc;

/// What a worker pushes back for every task it consumes.
pub type Outcome<R, E> = Result<R, WorkerFailure<E>>;

/// The function a pool is targeted on, once erased and shared by all workers.
pub(crate) type BoundFn<Args, R, E> = Arc<dyn Fn(Args) -> Result<R, E> + Send + Sync + 'static>;

/// A function that can be mapped by the pool.
///
/// `Args` is the argument tuple of one task. The tuple's elements are
/// passed to the function as positional arguments, so a closure taking two
/// parameters is targeted with `Args = (A, B)`.
pub trait TaskFn<Args>: Send + Sync + 'static {
  type Output;
  type Error;

  fn call(&self, args: Args) -> Result<Self::Output, Self::Error>;
}

macro_rules! impl_task_fn {
  ($($arg:ident),*) => {
    impl<F, R, E, $($arg,)*> TaskFn<($($arg,)*)> for F
    where
      F: Fn($($arg),*) -> Result<R, E> + Send + Sync + 'static,
    {
      type Output = R;
      type Error = E;

      #[allow(non_snake_case)]
      fn call(&self, ($($arg,)*): ($($arg,)*)) -> Result<R, E> {
        (self)($($arg),*)
      }
    }
  };
}

impl_task_fn!();
impl_task_fn!(A);
impl_task_fn!(A, B);
impl_task_fn!(A, B, C);
impl_task_fn!(A, B, C, D);

/// Normalizes a submitted item into the argument tuple of one task.
///
/// Any single value becomes a 1-tuple; tuples of arity 0 to 4, including an
/// explicit `(x,)`, pass through unchanged.
pub trait IntoArgs<Args> {
  fn into_args(self) -> Args;
}

impl<T> IntoArgs<(T,)> for T {
  fn into_args(self) -> (T,) {
    (self,)
  }
}

impl<A> IntoArgs<(A,)> for (A,) {
  fn into_args(self) -> (A,) {
    self
  }
}

impl IntoArgs<()> for () {
  fn into_args(self) {}
}

impl<A, B> IntoArgs<(A, B)> for (A, B) {
  fn into_args(self) -> (A, B) {
    self
  }
}

impl<A, B, C> IntoArgs<(A, B, C)> for (A, B, C) {
  fn into_args(self) -> (A, B, C) {
    self
  }
}

impl<A, B, C, D> IntoArgs<(A, B, C, D)> for (A, B, C, D) {
  fn into_args(self) -> (A, B, C, D) {
    self
  }
}

pub(crate) fn bind<F, Args>(func: F) -> BoundFn<Args, F::Output, F::Error>
where
  F: TaskFn<Args>,
{
  Arc::new(move |args| func.call(args))
}
