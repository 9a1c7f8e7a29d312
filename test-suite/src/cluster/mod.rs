#[cfg(test)]
mod test_async;
#[cfg(test)]
mod test_discovery;
#[cfg(test)]
mod test_fault;
