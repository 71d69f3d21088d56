/// Master/detail page stack. The root page is never popped, so there is always
/// exactly one active page: the top of the stack.
#[derive(Debug, Clone)]
pub struct NavigationStack<P> {
    root: P,
    pages: Vec<P>,
}

impl<P> NavigationStack<P> {
    pub fn new(root: P) -> Self {
        Self {
            root,
            pages: Vec::new(),
        }
    }

    pub fn current(&self) -> &P {
        self.pages.last().unwrap_or(&self.root)
    }

    pub fn current_mut(&mut self) -> &mut P {
        self.pages.last_mut().unwrap_or(&mut self.root)
    }

    pub fn drill_in(&mut self, page: P) {
        self.pages.push(page);
    }

    pub fn back(&mut self) -> Option<P> {
        self.pages.pop()
    }

    pub fn reset(&mut self, root: P) -> Vec<P> {
        let mut discarded = self.pages.drain(..).rev().collect::<Vec<_>>();
        discarded.push(std::mem::replace(&mut self.root, root));
        discarded
    }

    pub fn depth(&self) -> usize {
        self.pages.len() + 1
    }

    pub fn at_root(&self) -> bool {
        self.pages.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &P> {
        std::iter::once(&self.root).chain(self.pages.iter())
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut P> {
        std::iter::once(&mut self.root).chain(self.pages.iter_mut())
    }

    pub fn breadcrumbs(&self, label: impl Fn(&P) -> String) -> Vec<String> {
        self.iter().map(label).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::NavigationStack;

    #[derive(Debug, Clone, PartialEq, Eq)]
    struct Page {
        name: &'static str,
        cursor: usize,
    }

    fn page(name: &'static str) -> Page {
        Page { name, cursor: 0 }
    }

    #[test]
    fn back_on_root_is_a_noop() {
        let mut stack = NavigationStack::new(page("root"));
        for _ in 0..5 {
            assert_eq!(stack.back(), None);
        }
        assert_eq!(stack.depth(), 1);
        assert_eq!(stack.current().name, "root");
    }

    #[test]
    fn drill_in_then_back_restores_previous_cursor() {
        let mut stack = NavigationStack::new(page("pods"));
        stack.current_mut().cursor = 4;

        stack.drill_in(page("containers"));
        stack.current_mut().cursor = 1;
        assert_eq!(stack.depth(), 2);

        let popped = stack.back();
        assert_eq!(popped.map(|page| page.name), Some("containers"));
        assert_eq!(
            stack.current(),
            &Page {
                name: "pods",
                cursor: 4
            }
        );
    }

    #[test]
    fn reset_discards_every_page_and_installs_new_root() {
        let mut stack = NavigationStack::new(page("ns"));
        stack.drill_in(page("pods"));
        stack.drill_in(page("containers"));

        let discarded = stack.reset(page("secrets"));
        let names = discarded.iter().map(|page| page.name).collect::<Vec<_>>();
        assert_eq!(names, vec!["containers", "pods", "ns"]);
        assert!(stack.at_root());
        assert_eq!(stack.current().name, "secrets");
    }

    #[test]
    fn iter_walks_from_root_to_top() {
        let mut stack = NavigationStack::new(page("ns"));
        stack.drill_in(page("pods"));
        let names = stack.iter().map(|page| page.name).collect::<Vec<_>>();
        assert_eq!(names, vec!["ns", "pods"]);
        assert_eq!(
            stack.breadcrumbs(|page| page.name.to_uppercase()),
            vec!["NS".to_string(), "PODS".to_string()]
        );
    }
}
