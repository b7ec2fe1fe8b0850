use super::*;

#[test]
fn default_template_matches_day_of_the_dead_prompt() {
    let template = PromptTemplate::for_topic("Day of the Dead");
    let rendered = template.render(["chunk one", "chunk two"], "When is it observed?");

    assert_eq!(
        rendered,
        "You are a bot that answers questions about Day of the Dead, using only the context provided.\n\
         If you don't know the answer, simply state that you don't know.\n\n\
         chunk one\n\nchunk two\n\n\
         Question: When is it observed?"
    );
    assert!(rendered.contains(DONT_KNOW_INSTRUCTION));
}

#[test]
fn every_chunk_appears_verbatim() {
    let chunks = [
        "The Day of the Dead is observed on November 1 and 2.",
        "Families build ofrendas.",
        "Marigolds guide the spirits.",
    ];
    let rendered = PromptTemplate::for_topic("Day of the Dead").render(chunks, "Why marigolds?");

    for chunk in chunks {
        assert!(rendered.contains(chunk));
    }
    assert!(rendered.ends_with("Question: Why marigolds?"));
}

#[test]
fn empty_context_still_renders() {
    let rendered = PromptTemplate::for_topic("Day of the Dead").render([], "Anything?");
    assert!(rendered.contains("\n\n\n\nQuestion: Anything?"));
}

#[test]
fn custom_template() {
    let template = PromptTemplate::new("About {topic}:\n{context}\nQ: {question}\nA:", "Tides")
        .expect("template is valid");
    assert_eq!(template.as_str(), "About Tides:\n{context}\nQ: {question}\nA:");

    let rendered = template.render(["The moon pulls the sea."], "What causes tides?");
    assert_eq!(
        rendered,
        "About Tides:\nThe moon pulls the sea.\nQ: What causes tides?\nA:"
    );
}

#[test]
fn template_without_placeholders_is_rejected() {
    assert!(PromptTemplate::new("Just answer: {question}", "x").is_err());
    assert!(PromptTemplate::new("Context only: {context}", "x").is_err());
}

#[test]
fn substituted_text_is_not_rescanned() {
    let template = PromptTemplate::for_topic("Braces");
    let rendered = template.render(["literal {question} in context"], "real question");

    assert!(rendered.contains("literal {question} in context"));
    assert!(rendered.ends_with("Question: real question"));
}

#[test]
fn unknown_braces_are_kept() {
    let template =
        PromptTemplate::new("{context} {other} {question}", "x").expect("template is valid");
    assert_eq!(template.render(["c"], "q"), "c {other} q");
}
